//! Shared collaborators for the integration tests: recording workers, a store
//! that fails on demand, and fixed-answer estimator and remediation doubles.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use phase_pipeline::completion::EstimatorError;
use phase_pipeline::config::CacheConfig;
use phase_pipeline::handoff::{HandoffBundle, PhaseArtifacts};
use phase_pipeline::registry::StoreError;
use phase_pipeline::workers::{RemediationError, RemediationRequest, WorkerError};
use phase_pipeline::{
    ConfidenceEstimator, EventBus, MemoryPhaseStore, Phase, PhaseProgress, PhaseStateRegistry, PhaseStore,
    PhaseWorker, PipelineConfig, ProgressSnapshot, RemediationCollaborator, TransitionExecutor, TransitionRecord,
    WorkerRegistry, WorkflowId, WorkflowInstance,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerCall {
    Start { workflow_id: WorkflowId, source: Option<Phase> },
    Stop { workflow_id: WorkflowId },
}

/// Records every start/stop; can be told to fail starts or to take its time
#[derive(Default)]
pub struct RecordingWorker {
    calls: Mutex<Vec<WorkerCall>>,
    fail_start: AtomicBool,
    delay: Mutex<Option<Duration>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingWorker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let worker = Self::default();
        worker.fail_start.store(true, Ordering::SeqCst);
        Arc::new(worker)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        let worker = Self::default();
        *worker.delay.lock().unwrap() = Some(delay);
        Arc::new(worker)
    }

    pub fn calls(&self) -> Vec<WorkerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, WorkerCall::Start { .. }))
            .count()
    }

    pub fn stops(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, WorkerCall::Stop { .. }))
            .count()
    }

    /// Highest number of start calls that were in flight at the same time
    pub fn max_concurrent_starts(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhaseWorker for RecordingWorker {
    async fn start(&self, workflow_id: &WorkflowId, handoff: Option<HandoffBundle>) -> Result<(), WorkerError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.calls.lock().unwrap().push(WorkerCall::Start {
            workflow_id: workflow_id.clone(),
            source: handoff.map(|bundle| bundle.source_phase()),
        });
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(WorkerError::StartFailed("worker pool exhausted".into()));
        }
        Ok(())
    }

    async fn stop(&self, workflow_id: &WorkflowId) -> Result<(), WorkerError> {
        self.calls.lock().unwrap().push(WorkerCall::Stop {
            workflow_id: workflow_id.clone(),
        });
        Ok(())
    }
}

/// In-memory store whose writes can be made to fail
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryPhaseStore,
    failing_saves: AtomicUsize,
    fail_committed_appends: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` instance saves fail
    pub fn fail_next_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Appending a committed record fails; rejected and rolled back records still land
    pub fn fail_committed_appends(&self, fail: bool) {
        self.fail_committed_appends.store(fail, Ordering::SeqCst);
    }

    fn unavailable() -> StoreError {
        StoreError::Unavailable("disk full".into())
    }
}

#[async_trait]
impl PhaseStore for FlakyStore {
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        self.inner.insert_instance(instance).await
    }

    async fn load_instance(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowInstance>, StoreError> {
        self.inner.load_instance(workflow_id).await
    }

    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError> {
        let remaining = self.failing_saves.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_saves.store(remaining - 1, Ordering::SeqCst);
            return Err(Self::unavailable());
        }
        self.inner.save_instance(instance).await
    }

    async fn list_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError> {
        self.inner.list_instances().await
    }

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), StoreError> {
        if record.is_committed() && self.fail_committed_appends.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.append_transition(record).await
    }

    async fn transitions(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError> {
        self.inner.transitions(workflow_id).await
    }

    async fn save_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError> {
        self.inner.save_progress(snapshot).await
    }

    async fn load_progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError> {
        self.inner.load_progress(workflow_id).await
    }

    async fn save_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        artifacts: &PhaseArtifacts,
    ) -> Result<(), StoreError> {
        self.inner.save_artifacts(workflow_id, phase, artifacts).await
    }

    async fn load_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
    ) -> Result<Option<PhaseArtifacts>, StoreError> {
        self.inner.load_artifacts(workflow_id, phase).await
    }

    async fn save_handoff(&self, bundle: &HandoffBundle) -> Result<(), StoreError> {
        self.inner.save_handoff(bundle).await
    }

    async fn handoffs(&self, workflow_id: &WorkflowId) -> Result<Vec<HandoffBundle>, StoreError> {
        self.inner.handoffs(workflow_id).await
    }
}

/// Always answers with the same raw text
pub struct FixedEstimator(pub &'static str);

#[async_trait]
impl ConfidenceEstimator for FixedEstimator {
    async fn estimate(&self, _phase: Phase, _artifacts: &PhaseArtifacts) -> Result<String, EstimatorError> {
        Ok(self.0.to_string())
    }
}

#[derive(Default)]
pub struct RecordingRemediation {
    requests: Mutex<Vec<RemediationRequest>>,
}

impl RecordingRemediation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<RemediationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemediationCollaborator for RecordingRemediation {
    async fn remediate(&self, request: RemediationRequest) -> Result<(), RemediationError> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

/// Executor over `store` with a registered `wf-1` in ideation
pub async fn executor_with(
    store: Arc<dyn PhaseStore>,
    workers: WorkerRegistry,
    config: &PipelineConfig,
) -> (TransitionExecutor, Arc<EventBus>, WorkflowId) {
    let registry = PhaseStateRegistry::new(store, &CacheConfig::default());
    let instance = registry
        .create_workflow(WorkflowInstance::new(WorkflowId::new("wf-1")))
        .await
        .unwrap();
    let events = Arc::new(EventBus::default());
    let executor = TransitionExecutor::new(registry, events.clone(), config).with_workers(workers);
    (executor, events, instance.id)
}

pub fn ideation_progress(workflow_id: &WorkflowId, completion: f64, blockers: u32) -> ProgressSnapshot {
    ProgressSnapshot::new(workflow_id.clone(), Phase::Ideation)
        .with_completion(completion)
        .with_blockers(blockers)
        .with_pending_questions(blockers)
}
