//! Pipeline coordinator: the facade phase workers and operators talk to.
//!
//! Worker signals come in here. Progress reports are stored and broadcast;
//! readiness signals run the phase's detector and the advance policy; repeated
//! failures go to the remediation collaborator. Every state change still goes
//! through the [`TransitionExecutor`].

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::completion::{
    standard_detectors, AdvanceDecision, AdvancePolicy, ConfidenceEstimator, DetectorError, ReadinessAnalyzer,
    ThresholdPolicy,
};
use crate::config::PipelineConfig;
use crate::events::{EventBus, EventSubscription, PipelineEvent};
use crate::handoff::{HandoffBundle, PhaseArtifacts};
use crate::registry::{PhaseStateRegistry, PhaseStore, StoreError};
use crate::transitions::{
    TargetOption, TransitionError, TransitionExecutor, TransitionRequest, TransitionResult,
};
use crate::workers::{
    PhaseSignal, RemediationCollaborator, RemediationError, RemediationRequest, WorkerRegistry, WorkerSignal,
};
use crate::workflow::{
    Phase, PhaseProgress, ProgressSnapshot, TransitionRecord, TriggeringActor, WorkflowId, WorkflowInstance,
};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remediation(#[from] RemediationError),
}

/// What the coordinator did with a worker signal
#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    /// Sent by a worker whose phase is no longer current, or otherwise inapplicable
    Ignored { reason: String },
    ProgressRecorded,
    /// The policy advanced the workflow automatically
    Advanced(TransitionRecord),
    /// A `transition_available` advisory was published
    AdvisoryPublished { target: Phase, missing: Vec<String> },
    Held { reason: String },
    /// The terminal phase's worker finished
    Completed,
    FailureRecorded { attempt_count: u32 },
    RemediationRequested { attempt_count: u32 },
}

pub struct PipelineCoordinator {
    executor: TransitionExecutor,
    events: Arc<EventBus>,
    detectors: HashMap<Phase, Arc<dyn ReadinessAnalyzer>>,
    policy: Arc<dyn AdvancePolicy>,
    remediation: Option<Arc<dyn RemediationCollaborator>>,
    failure_threshold: u32,
}

impl PipelineCoordinator {
    pub fn new(executor: TransitionExecutor, events: Arc<EventBus>) -> Self {
        Self {
            executor,
            events,
            detectors: HashMap::new(),
            policy: Arc::new(ThresholdPolicy::default()),
            remediation: None,
            failure_threshold: 3,
        }
    }

    /// Wire up registry, bus, executor, standard detectors and threshold policy from configuration
    pub fn from_config(
        store: Arc<dyn PhaseStore>,
        workers: WorkerRegistry,
        estimator: Option<Arc<dyn ConfidenceEstimator>>,
        config: &PipelineConfig,
    ) -> Self {
        let registry = PhaseStateRegistry::new(store.clone(), &config.cache);
        let events = Arc::new(EventBus::new(config.events.channel_capacity));
        let executor = TransitionExecutor::new(registry, events.clone(), config).with_workers(workers);

        Self::new(executor, events)
            .with_detectors(standard_detectors(store, estimator, &config.completion))
            .with_policy(Arc::new(ThresholdPolicy::new(config.completion.clone())))
            .with_failure_threshold(config.remediation.failure_threshold)
    }

    pub fn with_detectors(mut self, detectors: HashMap<Phase, Arc<dyn ReadinessAnalyzer>>) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn AdvancePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_remediation(mut self, remediation: Arc<dyn RemediationCollaborator>) -> Self {
        self.remediation = Some(remediation);
        self
    }

    pub fn with_failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    pub fn executor(&self) -> &TransitionExecutor {
        &self.executor
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn registry(&self) -> &PhaseStateRegistry {
        self.executor.registry()
    }

    // Queries

    pub async fn instance(&self, workflow_id: &WorkflowId) -> Result<WorkflowInstance, TransitionError> {
        self.registry()
            .load(workflow_id)
            .await?
            .ok_or_else(|| TransitionError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })
    }

    pub async fn current_phase(&self, workflow_id: &WorkflowId) -> Result<Phase, TransitionError> {
        Ok(self.instance(workflow_id).await?.current_phase)
    }

    pub async fn list_workflows(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        self.registry().list().await
    }

    pub async fn progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError> {
        self.registry().progress(workflow_id).await
    }

    /// Targets that pass both the structural and the domain guards right now
    pub async fn valid_targets(&self, workflow_id: &WorkflowId) -> Result<Vec<Phase>, TransitionError> {
        let instance = self.instance(workflow_id).await?;
        let progress = self.registry().progress(workflow_id).await?;
        Ok(self.executor.validator().valid_targets(&instance, &progress))
    }

    /// Every structurally reachable target with what still blocks it
    pub async fn target_options(&self, workflow_id: &WorkflowId) -> Result<Vec<TargetOption>, TransitionError> {
        let instance = self.instance(workflow_id).await?;
        let progress = self.registry().progress(workflow_id).await?;
        Ok(self.executor.validator().target_options(&instance, &progress))
    }

    pub async fn history(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError> {
        self.registry().history(workflow_id).await
    }

    pub async fn handoffs(&self, workflow_id: &WorkflowId) -> Result<Vec<HandoffBundle>, StoreError> {
        self.registry().store().handoffs(workflow_id).await
    }

    // Commands

    /// Register a workflow at intake and start its initial phase's worker
    pub async fn create_workflow(&self, instance: WorkflowInstance) -> Result<WorkflowInstance, TransitionError> {
        let instance = self.registry().create_workflow(instance).await?;
        self.executor.launch(&instance.id).await?;
        Ok(instance)
    }

    pub async fn request_transition(&self, request: TransitionRequest) -> Result<TransitionResult, TransitionError> {
        self.executor.request_transition(request).await
    }

    pub async fn pause(
        &self,
        workflow_id: &WorkflowId,
        reason: impl Into<String>,
        actor: TriggeringActor,
    ) -> Result<TransitionResult, TransitionError> {
        self.executor.pause(workflow_id, reason, actor).await
    }

    pub async fn resume(
        &self,
        workflow_id: &WorkflowId,
        reason: impl Into<String>,
        actor: TriggeringActor,
    ) -> Result<TransitionResult, TransitionError> {
        self.executor.resume(workflow_id, reason, actor).await
    }

    /// Store what a phase worker has accumulated so far
    pub async fn record_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        artifacts: &PhaseArtifacts,
    ) -> Result<(), StoreError> {
        self.registry().store().save_artifacts(workflow_id, phase, artifacts).await
    }

    /// Drop the cached instance after out-of-band changes to persisted state
    pub async fn invalidate(&self, workflow_id: &WorkflowId) {
        self.registry().invalidate(workflow_id).await;
    }

    /// Run the phase's detector and store the snapshot
    pub async fn analyze(&self, workflow_id: &WorkflowId, phase: Phase) -> Result<ProgressSnapshot, CoordinatorError> {
        let detector = self
            .detectors
            .get(&phase)
            .ok_or(DetectorError::UnsupportedPhase(phase))?;
        let snapshot = detector.analyze_readiness(workflow_id).await?;
        self.store_progress(&snapshot).await?;
        Ok(snapshot)
    }

    // Streaming

    pub fn subscribe(&self, workflow_id: &WorkflowId) -> EventSubscription {
        self.events.subscribe(workflow_id)
    }

    pub fn subscribe_all(&self) -> EventSubscription {
        self.events.subscribe_all()
    }

    // Worker signals

    pub async fn handle_signal(&self, signal: PhaseSignal) -> Result<SignalOutcome, CoordinatorError> {
        let instance = self.instance(&signal.workflow_id).await?;
        if instance.current_phase != signal.phase {
            debug!(
                workflow_id = %signal.workflow_id,
                sender = %signal.phase,
                current = %instance.current_phase,
                "Ignoring stale worker signal"
            );
            return Ok(SignalOutcome::Ignored {
                reason: format!(
                    "signal from the {} worker but the workflow is in {}",
                    signal.phase, instance.current_phase
                ),
            });
        }

        match signal.signal {
            WorkerSignal::Progress { snapshot } => {
                if let Some(reason) = mismatched(&signal.workflow_id, signal.phase, &snapshot) {
                    return Ok(SignalOutcome::Ignored { reason });
                }
                self.store_progress(&in_range(snapshot)).await?;
                Ok(SignalOutcome::ProgressRecorded)
            }
            WorkerSignal::ReadyForNextPhase { metrics } => self.on_ready(&instance, signal.phase, metrics).await,
            WorkerSignal::Completed => {
                if signal.phase.ready_target().is_none() {
                    info!(workflow_id = %signal.workflow_id, phase = %signal.phase, "Phase worker completed");
                    return Ok(SignalOutcome::Completed);
                }
                self.on_ready(&instance, signal.phase, None).await
            }
            WorkerSignal::Failed { attempt_count, error } => {
                self.on_failure(&signal.workflow_id, signal.phase, attempt_count, error)
                    .await
            }
        }
    }

    async fn on_ready(
        &self,
        instance: &WorkflowInstance,
        phase: Phase,
        metrics: Option<ProgressSnapshot>,
    ) -> Result<SignalOutcome, CoordinatorError> {
        let metrics = match metrics {
            Some(metrics) => {
                if let Some(reason) = mismatched(&instance.id, phase, &metrics) {
                    return Ok(SignalOutcome::Ignored { reason });
                }
                let metrics = in_range(metrics);
                self.store_progress(&metrics).await?;
                metrics
            }
            None => match self.detectors.get(&phase) {
                Some(_) => self.analyze(&instance.id, phase).await?,
                None => {
                    return Ok(SignalOutcome::Held {
                        reason: format!("no completion detector for {}", phase),
                    })
                }
            },
        };

        match self.policy.decide(instance, &metrics) {
            AdvanceDecision::AutoAdvance { target } => {
                let request = TransitionRequest::new(
                    instance.id.clone(),
                    target,
                    format!("auto-advance at confidence {:.2}", metrics.confidence),
                )
                .by(TriggeringActor::Auto);

                match self.executor.request_transition(request).await {
                    Ok(TransitionResult::Committed(record)) => Ok(SignalOutcome::Advanced(record)),
                    Ok(TransitionResult::NoOp { phase }) => Ok(SignalOutcome::Held {
                        reason: format!("workflow is already in {}", phase),
                    }),
                    Err(e) => {
                        info!(
                            workflow_id = %instance.id,
                            to = %target,
                            reason_code = e.reason_code(),
                            "Automatic advance refused, publishing advisory instead"
                        );
                        let missing = match e {
                            TransitionError::PrerequisiteNotMet { missing, .. } => missing,
                            other => vec![other.to_string()],
                        };
                        Ok(self.advise(instance, target, metrics, missing))
                    }
                }
            }
            AdvanceDecision::NotifyAvailable { target } => {
                let progress = self.registry().progress(&instance.id).await?;
                let check = self
                    .executor
                    .validator()
                    .check_prerequisites(instance, &progress, target);
                Ok(self.advise(instance, target, metrics, check.missing))
            }
            AdvanceDecision::Hold { reason } => Ok(SignalOutcome::Held { reason }),
        }
    }

    fn advise(
        &self,
        instance: &WorkflowInstance,
        target: Phase,
        metrics: ProgressSnapshot,
        missing: Vec<String>,
    ) -> SignalOutcome {
        self.events.publish(PipelineEvent::TransitionAvailable {
            workflow_id: instance.id.clone(),
            from: instance.current_phase,
            to: target,
            metrics,
            missing: missing.clone(),
            timestamp: Utc::now(),
        });
        SignalOutcome::AdvisoryPublished { target, missing }
    }

    async fn on_failure(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        attempt_count: u32,
        error: Option<String>,
    ) -> Result<SignalOutcome, CoordinatorError> {
        warn!(
            workflow_id = %workflow_id,
            phase = %phase,
            attempt_count,
            error = error.as_deref().unwrap_or("unspecified"),
            "Phase worker reported a failure"
        );

        if attempt_count < self.failure_threshold {
            return Ok(SignalOutcome::FailureRecorded { attempt_count });
        }
        let Some(remediation) = &self.remediation else {
            error!(
                workflow_id = %workflow_id,
                phase = %phase,
                attempt_count,
                "Repeated failures but no remediation collaborator is configured"
            );
            return Ok(SignalOutcome::FailureRecorded { attempt_count });
        };

        remediation
            .remediate(RemediationRequest {
                workflow_id: workflow_id.clone(),
                phase,
                attempt_count,
                error,
                requested_at: Utc::now(),
            })
            .await?;
        info!(workflow_id = %workflow_id, phase = %phase, attempt_count, "Failure forwarded to remediation");
        Ok(SignalOutcome::RemediationRequested { attempt_count })
    }

    async fn store_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        self.registry().record_progress(snapshot).await?;
        self.events.publish(PipelineEvent::Progress {
            snapshot: snapshot.clone(),
        });
        Ok(())
    }
}

/// Why a snapshot cannot be accepted from this sender, if it cannot
fn mismatched(workflow_id: &WorkflowId, phase: Phase, snapshot: &ProgressSnapshot) -> Option<String> {
    if snapshot.workflow_id != *workflow_id || snapshot.phase != phase {
        Some(format!(
            "snapshot for {}/{} sent by the {} worker of {}",
            snapshot.workflow_id, snapshot.phase, phase, workflow_id
        ))
    } else {
        None
    }
}

/// Worker-supplied scores are clamped before anything trusts them
fn in_range(snapshot: ProgressSnapshot) -> ProgressSnapshot {
    if snapshot.is_in_range() {
        return snapshot;
    }
    warn!(
        workflow_id = %snapshot.workflow_id,
        phase = %snapshot.phase,
        completion_score = snapshot.completion_score,
        confidence = snapshot.confidence,
        "Clamping out-of-range progress scores"
    );
    snapshot.clamped()
}
