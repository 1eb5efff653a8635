// Transition Executor - the only writer of workflow state after intake
//
// Under the per-workflow lock: load, validate, run pre-hooks, mutate, persist,
// hand off to the next worker, record and emit. Post-hooks run after the lock is
// released. Any failure after mutation is compensated so callers always observe
// the pre-transition phase on error.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn, Instrument};

use super::errors::TransitionError;
use super::hooks::{HookChain, TransitionContext};
use super::locks::WorkflowLocks;
use super::validator::{can_transition, TransitionValidator};
use crate::config::{ExecutorConfig, PipelineConfig};
use crate::events::{EventBus, PipelineEvent};
use crate::handoff::{HandoffBuilder, HandoffBundle};
use crate::registry::PhaseStateRegistry;
use crate::telemetry::{create_transition_span, generate_correlation_id};
use crate::workers::{WorkerError, WorkerRegistry};
use crate::workflow::{Phase, TransitionOutcome, TransitionRecord, TriggeringActor, WorkflowId, WorkflowInstance};

/// A request to move a workflow to `target`
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub workflow_id: WorkflowId,
    pub target: Phase,
    pub reason: String,
    /// Skip the structural and domain guards; recorded on the audit entry
    pub force: bool,
    pub actor: TriggeringActor,
}

impl TransitionRequest {
    pub fn new(workflow_id: WorkflowId, target: Phase, reason: impl Into<String>) -> Self {
        Self {
            workflow_id,
            target,
            reason: reason.into(),
            force: false,
            actor: TriggeringActor::Human,
        }
    }

    pub fn forced(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn by(mut self, actor: TriggeringActor) -> Self {
        self.actor = actor;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionResult {
    Committed(TransitionRecord),
    /// The workflow was already in the requested phase
    NoOp { phase: Phase },
}

impl TransitionResult {
    pub fn record(&self) -> Option<&TransitionRecord> {
        match self {
            TransitionResult::Committed(record) => Some(record),
            TransitionResult::NoOp { .. } => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, TransitionResult::NoOp { .. })
    }

    /// Phase the workflow is in after the call
    pub fn phase(&self) -> Phase {
        match self {
            TransitionResult::Committed(record) => record.to_phase,
            TransitionResult::NoOp { phase } => *phase,
        }
    }
}

/// How far a transition got before failing, for compensation
#[derive(Debug, Clone, Copy, Default)]
struct Progressed {
    stopped_previous: bool,
    started_target: bool,
}

pub struct TransitionExecutor {
    registry: PhaseStateRegistry,
    validator: TransitionValidator,
    hooks: HookChain,
    workers: WorkerRegistry,
    handoffs: HandoffBuilder,
    events: Arc<EventBus>,
    locks: WorkflowLocks,
    config: ExecutorConfig,
}

impl TransitionExecutor {
    pub fn new(registry: PhaseStateRegistry, events: Arc<EventBus>, config: &PipelineConfig) -> Self {
        let handoffs = HandoffBuilder::new(registry.store().clone());
        Self {
            registry,
            validator: TransitionValidator::new(config.prerequisites.clone()),
            hooks: HookChain::with_builtin(),
            workers: WorkerRegistry::new(),
            handoffs,
            events,
            locks: WorkflowLocks::new(),
            config: config.executor.clone(),
        }
    }

    pub fn with_workers(mut self, workers: WorkerRegistry) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn registry(&self) -> &PhaseStateRegistry {
        &self.registry
    }

    pub fn validator(&self) -> &TransitionValidator {
        &self.validator
    }

    pub fn locks(&self) -> &WorkflowLocks {
        &self.locks
    }

    pub async fn request_transition(&self, request: TransitionRequest) -> Result<TransitionResult, TransitionError> {
        let correlation_id = generate_correlation_id();
        let span = create_transition_span(
            request.workflow_id.as_str(),
            request.target.as_str(),
            request.actor.as_str(),
            &correlation_id,
        );

        async {
            let started = Instant::now();
            let acquired = self
                .locks
                .acquire(
                    &request.workflow_id,
                    self.config.conflict_policy,
                    self.config.lock_wait_timeout(),
                )
                .await;
            let guard = match acquired {
                Ok(guard) => guard,
                Err(e) => {
                    warn!(workflow_id = %request.workflow_id, error = %e, "Transition refused, workflow busy");
                    let conflict = TransitionError::ConcurrentTransitionConflict {
                        workflow_id: request.workflow_id.clone(),
                    };
                    return Err(self.reject_busy(&request, conflict).await);
                }
            };

            let outcome = self.execute_locked(&request, &correlation_id).await;
            drop(guard);

            let duration_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(Some((record, context))) => {
                    self.hooks.run_after(&context).await;
                    debug!(workflow_id = %request.workflow_id, duration_ms, "Transition finished");
                    Ok(TransitionResult::Committed(record))
                }
                Ok(None) => Ok(TransitionResult::NoOp { phase: request.target }),
                Err(e) => {
                    warn!(
                        workflow_id = %request.workflow_id,
                        to = %request.target,
                        reason_code = e.reason_code(),
                        duration_ms,
                        error = %e,
                        "Transition did not commit"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Transition to `paused`; pausing a paused workflow is a no-op
    pub async fn pause(
        &self,
        workflow_id: &WorkflowId,
        reason: impl Into<String>,
        actor: TriggeringActor,
    ) -> Result<TransitionResult, TransitionError> {
        self.request_transition(TransitionRequest::new(workflow_id.clone(), Phase::Paused, reason).by(actor))
            .await
    }

    /// Transition a paused workflow back to the phase it was paused from
    pub async fn resume(
        &self,
        workflow_id: &WorkflowId,
        reason: impl Into<String>,
        actor: TriggeringActor,
    ) -> Result<TransitionResult, TransitionError> {
        let instance = self.load_existing(workflow_id).await?;
        let target = instance.resume_target().ok_or_else(|| TransitionError::NotPaused {
            workflow_id: workflow_id.clone(),
            phase: instance.current_phase,
        })?;
        // Validation under the lock re-checks that the workflow is still paused
        self.request_transition(TransitionRequest::new(workflow_id.clone(), target, reason).by(actor))
            .await
    }

    /// Start the worker of a newly registered workflow's initial phase
    pub async fn launch(&self, workflow_id: &WorkflowId) -> Result<(), TransitionError> {
        let _guard = self
            .locks
            .acquire(workflow_id, self.config.conflict_policy, self.config.lock_wait_timeout())
            .await
            .map_err(|_| TransitionError::ConcurrentTransitionConflict {
                workflow_id: workflow_id.clone(),
            })?;
        let instance = self.load_existing(workflow_id).await?;
        let phase = instance.current_phase;
        let bundle = self.prepare_handoff(workflow_id, phase, None).await.map_err(|cause| {
            TransitionError::WorkerStartFailure { phase, cause }
        })?;
        self.start_worker(workflow_id, phase, bundle)
            .await
            .map_err(|e| TransitionError::WorkerStartFailure {
                phase,
                cause: e.to_string(),
            })
    }

    async fn load_existing(&self, workflow_id: &WorkflowId) -> Result<WorkflowInstance, TransitionError> {
        self.registry
            .load(workflow_id)
            .await?
            .ok_or_else(|| TransitionError::WorkflowNotFound {
                workflow_id: workflow_id.clone(),
            })
    }

    /// Steps run while the workflow lock is held. `Ok(None)` is the idempotent no-op.
    async fn execute_locked(
        &self,
        request: &TransitionRequest,
        correlation_id: &str,
    ) -> Result<Option<(TransitionRecord, TransitionContext)>, TransitionError> {
        let instance = self.load_existing(&request.workflow_id).await?;
        let from = instance.current_phase;
        let target = request.target;
        tracing::Span::current().record("from", from.as_str());

        if from == target {
            debug!(workflow_id = %request.workflow_id, phase = %from, "Already in requested phase");
            return Ok(None);
        }

        if !request.force {
            if !can_transition(from, target) {
                return Err(self
                    .reject(request, from, TransitionError::InvalidTransition { from, to: target })
                    .await);
            }

            let progress = self.registry.progress(&request.workflow_id).await?;
            let check = self.validator.check_prerequisites(&instance, &progress, target);
            if !check.met {
                return Err(self
                    .reject(
                        request,
                        from,
                        TransitionError::PrerequisiteNotMet {
                            target,
                            missing: check.missing,
                        },
                    )
                    .await);
            }
        } else {
            info!(
                workflow_id = %request.workflow_id,
                from = %from,
                to = %target,
                actor = %request.actor,
                "Forcing transition past validation"
            );
        }

        let context = TransitionContext {
            workflow_id: request.workflow_id.clone(),
            from,
            to: target,
            reason: request.reason.clone(),
            actor: request.actor,
            forced: request.force,
            correlation_id: correlation_id.to_string(),
            instance: instance.clone(),
        };

        if let Err((hook, e)) = self.hooks.run_before(&context).await {
            return Err(self
                .reject(
                    request,
                    from,
                    TransitionError::HookFailure {
                        hook,
                        reason: e.to_string(),
                    },
                )
                .await);
        }

        // From here on every failure is compensated
        let next = instance.transitioned(target, &request.reason);
        let mut progressed = Progressed::default();

        if let Err(e) = self.registry.save(&next).await {
            let failure = TransitionError::PersistenceFailure { cause: e.to_string() };
            return Err(self.roll_back(&instance, request, progressed, failure).await);
        }

        let bundle = match self.prepare_handoff(&request.workflow_id, target, Some(from)).await {
            Ok(bundle) => bundle,
            Err(cause) => {
                let failure = TransitionError::PersistenceFailure { cause };
                return Err(self.roll_back(&instance, request, progressed, failure).await);
            }
        };

        match self.stop_worker(&request.workflow_id, from).await {
            Ok(stopped) => progressed.stopped_previous = stopped,
            Err(e) => {
                let failure = TransitionError::WorkerStartFailure {
                    phase: from,
                    cause: e.to_string(),
                };
                return Err(self.roll_back(&instance, request, progressed, failure).await);
            }
        }

        if let Err(e) = self.start_worker(&request.workflow_id, target, bundle).await {
            let failure = TransitionError::WorkerStartFailure {
                phase: target,
                cause: e.to_string(),
            };
            return Err(self.roll_back(&instance, request, progressed, failure).await);
        }
        progressed.started_target = self.workers.get(target).is_some();

        let record = TransitionRecord::new(
            request.workflow_id.clone(),
            from,
            target,
            request.reason.clone(),
            TransitionOutcome::Committed,
            request.actor,
            request.force,
        );
        if let Err(e) = self.registry.append_record(&record).await {
            let failure = TransitionError::PersistenceFailure {
                cause: format!("could not append the transition record: {}", e),
            };
            return Err(self.roll_back(&instance, request, progressed, failure).await);
        }

        // Emitted under the lock so subscribers see a workflow's transitions in order
        self.events.publish(PipelineEvent::transition(&record));

        info!(
            workflow_id = %request.workflow_id,
            from = %from,
            to = %target,
            actor = %request.actor,
            forced = request.force,
            revision = next.revision,
            outcome = %TransitionOutcome::Committed,
            "Transition committed"
        );

        Ok(Some((record, context)))
    }

    /// Write the rejected audit entry and hand the error back
    async fn reject(&self, request: &TransitionRequest, from: Phase, error: TransitionError) -> TransitionError {
        let record = TransitionRecord::new(
            request.workflow_id.clone(),
            from,
            request.target,
            request.reason.clone(),
            TransitionOutcome::Rejected,
            request.actor,
            request.force,
        )
        .with_detail(error.to_string());

        if let Err(e) = self.registry.append_record(&record).await {
            error!(
                workflow_id = %request.workflow_id,
                error = %e,
                "Failed to record rejected transition"
            );
        }
        error
    }

    /// Audit a request refused because another transition held the lock.
    ///
    /// The record's `from` is the last phase visible outside the lock, which may be
    /// about to change under the in-flight transition.
    async fn reject_busy(&self, request: &TransitionRequest, conflict: TransitionError) -> TransitionError {
        match self.registry.load(&request.workflow_id).await {
            Ok(Some(instance)) => self.reject(request, instance.current_phase, conflict).await,
            Ok(None) => TransitionError::WorkflowNotFound {
                workflow_id: request.workflow_id.clone(),
            },
            Err(e) => {
                error!(
                    workflow_id = %request.workflow_id,
                    error = %e,
                    "Failed to load workflow while recording a refused transition"
                );
                conflict
            }
        }
    }

    async fn roll_back(
        &self,
        original: &WorkflowInstance,
        request: &TransitionRequest,
        progressed: Progressed,
        failure: TransitionError,
    ) -> TransitionError {
        let workflow_id = &request.workflow_id;
        warn!(
            workflow_id = %workflow_id,
            from = %original.current_phase,
            to = %request.target,
            error = %failure,
            "Rolling back transition"
        );

        if progressed.started_target {
            if let Err(e) = self.stop_worker(workflow_id, request.target).await {
                error!(workflow_id = %workflow_id, phase = %request.target, error = %e, "Failed to stop worker during rollback");
            }
        }

        if let Err(e) = self.registry.save(original).await {
            error!(
                workflow_id = %workflow_id,
                error = %e,
                "Compensating write failed; persisted state may be ahead of the workflow"
            );
        }

        if progressed.stopped_previous {
            let phase = original.current_phase;
            let restarted = match self.prepare_handoff(workflow_id, phase, None).await {
                Ok(bundle) => self.start_worker(workflow_id, phase, bundle).await.map_err(|e| e.to_string()),
                Err(cause) => Err(cause),
            };
            if let Err(cause) = restarted {
                error!(workflow_id = %workflow_id, phase = %phase, error = %cause, "Failed to restart previous worker");
            }
        }

        let record = TransitionRecord::new(
            workflow_id.clone(),
            original.current_phase,
            request.target,
            request.reason.clone(),
            TransitionOutcome::RolledBack,
            request.actor,
            request.force,
        )
        .with_detail(failure.to_string());
        if let Err(e) = self.registry.append_record(&record).await {
            error!(workflow_id = %workflow_id, error = %e, "Failed to record rolled back transition");
        }

        failure
    }

    /// The bundle the `phase` worker starts with, if it has an upstream.
    ///
    /// A bundle is built and persisted only when the workflow leaves its source
    /// phase, directly or from the source's ready phase. Resumes, retries,
    /// back-edges and worker restarts hand over the latest persisted bundle for the
    /// pair, building one only if none exists yet.
    async fn prepare_handoff(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        from: Option<Phase>,
    ) -> Result<Option<HandoffBundle>, String> {
        let Some(source) = phase.handoff_source() else {
            return Ok(None);
        };
        let leaving_source = from.is_some_and(|from| from == source || source.ready_target() == Some(from));
        if !leaving_source {
            if let Some(bundle) = self.latest_handoff(workflow_id, source, phase).await? {
                debug!(
                    workflow_id = %workflow_id,
                    source = %source,
                    target = %phase,
                    bundle_id = %bundle.id(),
                    "Reusing handoff bundle"
                );
                return Ok(Some(bundle));
            }
        }

        let bundle = self
            .handoffs
            .build_handoff(source, workflow_id)
            .await
            .map_err(|e| format!("could not build the handoff bundle: {}", e))?;
        self.registry
            .store()
            .save_handoff(&bundle)
            .await
            .map_err(|e| format!("could not persist the handoff bundle: {}", e))?;
        Ok(Some(bundle))
    }

    async fn latest_handoff(
        &self,
        workflow_id: &WorkflowId,
        source: Phase,
        target: Phase,
    ) -> Result<Option<HandoffBundle>, String> {
        let bundles = self
            .registry
            .store()
            .handoffs(workflow_id)
            .await
            .map_err(|e| format!("could not read earlier handoff bundles: {}", e))?;
        Ok(bundles
            .into_iter()
            .rev()
            .find(|bundle| bundle.source_phase() == source && bundle.target_phase() == target))
    }

    /// Returns whether a worker was actually stopped
    async fn stop_worker(&self, workflow_id: &WorkflowId, phase: Phase) -> Result<bool, WorkerError> {
        let Some(worker) = self.workers.get(phase) else {
            debug!(workflow_id = %workflow_id, phase = %phase, "No worker registered to stop");
            return Ok(false);
        };
        bounded(self.config.worker_timeout(), "stop", worker.stop(workflow_id)).await?;
        debug!(workflow_id = %workflow_id, phase = %phase, "Worker stopped");
        Ok(true)
    }

    async fn start_worker(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        bundle: Option<HandoffBundle>,
    ) -> Result<(), WorkerError> {
        let Some(worker) = self.workers.get(phase) else {
            debug!(workflow_id = %workflow_id, phase = %phase, "No worker registered to start");
            return Ok(());
        };
        bounded(self.config.worker_timeout(), "start", worker.start(workflow_id, bundle)).await?;
        debug!(workflow_id = %workflow_id, phase = %phase, "Worker started");
        Ok(())
    }
}

/// A worker call that does not finish within `limit` counts as failed
async fn bounded<F>(limit: Duration, action: &str, call: F) -> Result<(), WorkerError>
where
    F: std::future::Future<Output = Result<(), WorkerError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::Unavailable(format!(
            "{} did not complete within {:?}",
            action, limit
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::registry::MemoryPhaseStore;
    use crate::workers::MockPhaseWorker;
    use crate::workflow::ProgressSnapshot;

    async fn setup(workers: WorkerRegistry) -> (TransitionExecutor, WorkflowId) {
        let registry = PhaseStateRegistry::new(Arc::new(MemoryPhaseStore::new()), &CacheConfig::default());
        let instance = registry
            .create_workflow(WorkflowInstance::new(WorkflowId::new("wf-1")))
            .await
            .unwrap();
        let executor = TransitionExecutor::new(registry, Arc::new(EventBus::default()), &PipelineConfig::default())
            .with_workers(workers);
        (executor, instance.id)
    }

    #[tokio::test]
    async fn test_forced_transition_skips_guards_and_is_flagged() {
        let (executor, id) = setup(WorkerRegistry::new()).await;

        let err = executor
            .request_transition(TransitionRequest::new(id.clone(), Phase::Building, "skip ahead"))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "invalid_transition");

        let result = executor
            .request_transition(TransitionRequest::new(id.clone(), Phase::Building, "skip ahead").forced(true))
            .await
            .unwrap();
        let record = result.record().unwrap();
        assert!(record.forced);
        assert_eq!(record.from_phase, Phase::Ideation);

        let history = executor.registry().history(&id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].outcome, TransitionOutcome::Rejected);
        assert!(history[0].detail.is_some());
    }

    #[tokio::test]
    async fn test_pause_and_resume_round_trip() {
        let (executor, id) = setup(WorkerRegistry::new()).await;

        let err = executor.resume(&id, "nothing to resume", TriggeringActor::Human).await.unwrap_err();
        assert!(matches!(err, TransitionError::NotPaused { phase: Phase::Ideation, .. }));

        executor.pause(&id, "vacation", TriggeringActor::Human).await.unwrap();
        assert!(executor.pause(&id, "again", TriggeringActor::Human).await.unwrap().is_noop());

        let resumed = executor.resume(&id, "back", TriggeringActor::Human).await.unwrap();
        assert_eq!(resumed.phase(), Phase::Ideation);
        let instance = executor.registry().load(&id).await.unwrap().unwrap();
        assert_eq!(instance.previous_phase, Some(Phase::Paused));
        assert_eq!(instance.revision, 2);
    }

    #[tokio::test]
    async fn test_failed_start_restarts_previous_worker() {
        let mut broken = MockPhaseWorker::new();
        broken
            .expect_start()
            .returning(|_, _| Err(WorkerError::StartFailed("no capacity".into())));
        let mut ideation = MockPhaseWorker::new();
        ideation.expect_stop().times(1).returning(|_| Ok(()));
        ideation.expect_start().times(1).returning(|_, _| Ok(()));

        let workers = WorkerRegistry::new()
            .with_worker(Phase::Ideation, Arc::new(ideation))
            .with_worker(Phase::Specification, Arc::new(broken));
        let (executor, id) = setup(workers).await;

        let err = executor
            .request_transition(TransitionRequest::new(id.clone(), Phase::Specification, "go").forced(true))
            .await
            .unwrap_err();
        assert!(err.was_rolled_back());

        let instance = executor.registry().load(&id).await.unwrap().unwrap();
        assert_eq!(instance.current_phase, Phase::Ideation);
        assert_eq!(instance.revision, 0);
    }

    #[tokio::test]
    async fn test_failed_stop_names_the_previous_worker() {
        let mut ideation = MockPhaseWorker::new();
        ideation
            .expect_stop()
            .times(1)
            .returning(|_| Err(WorkerError::StopFailed("stuck on a prompt".into())));
        ideation.expect_start().times(0);
        let mut specification = MockPhaseWorker::new();
        specification.expect_start().times(0);

        let workers = WorkerRegistry::new()
            .with_worker(Phase::Ideation, Arc::new(ideation))
            .with_worker(Phase::Specification, Arc::new(specification));
        let (executor, id) = setup(workers).await;

        let err = executor
            .request_transition(TransitionRequest::new(id.clone(), Phase::Specification, "go").forced(true))
            .await
            .unwrap_err();
        assert!(matches!(err, TransitionError::WorkerStartFailure { phase: Phase::Ideation, .. }));
        let message = err.to_string();
        assert!(message.contains("ideation worker"), "{}", message);
        assert!(message.contains("failed to stop"), "{}", message);
        assert_eq!(
            executor.registry().load(&id).await.unwrap().unwrap().current_phase,
            Phase::Ideation
        );
    }

    #[tokio::test]
    async fn test_bounded_times_out_slow_calls() {
        let result = bounded(Duration::from_millis(10), "start", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(WorkerError::Unavailable(msg)) if msg.contains("start")));
    }

    #[tokio::test]
    async fn test_specification_worker_receives_ideation_bundle() {
        let mut spec = MockPhaseWorker::new();
        spec.expect_start()
            .withf(|_, bundle| {
                bundle
                    .as_ref()
                    .map(|b| b.source_phase() == Phase::Ideation)
                    .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let (executor, id) = setup(WorkerRegistry::new().with_worker(Phase::Specification, Arc::new(spec))).await;
        executor
            .registry()
            .record_progress(&ProgressSnapshot::new(id.clone(), Phase::Ideation).with_completion(0.8))
            .await
            .unwrap();

        executor
            .request_transition(TransitionRequest::new(id.clone(), Phase::IdeationReady, "ready"))
            .await
            .unwrap();
        executor
            .request_transition(TransitionRequest::new(id.clone(), Phase::Specification, "go"))
            .await
            .unwrap();

        let bundles = executor.registry().store().handoffs(&id).await.unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].target_phase(), Phase::Specification);
    }
}
