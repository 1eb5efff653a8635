//! Collaborator interfaces the orchestrator consumes: phase workers, the signals
//! they send back, and the remediation collaborator for repeated failures.
//!
//! The orchestrator never looks inside a worker. It starts one with the handoff
//! bundle of the upstream phase, stops it when the workflow moves on, and reacts
//! to the signals below.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::handoff::HandoffBundle;
use crate::workflow::{Phase, ProgressSnapshot, WorkflowId};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker failed to start: {0}")]
    StartFailed(String),

    #[error("worker failed to stop: {0}")]
    StopFailed(String),

    #[error("worker unavailable: {0}")]
    Unavailable(String),
}

/// A long-running worker that owns one phase
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PhaseWorker: Send + Sync {
    /// `handoff` is `None` only for the pipeline's initial phase
    async fn start(&self, workflow_id: &WorkflowId, handoff: Option<HandoffBundle>) -> Result<(), WorkerError>;

    async fn stop(&self, workflow_id: &WorkflowId) -> Result<(), WorkerError>;
}

/// Workers by the phase they own
#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: HashMap<Phase, Arc<dyn PhaseWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_worker(mut self, phase: Phase, worker: Arc<dyn PhaseWorker>) -> Self {
        self.register(phase, worker);
        self
    }

    pub fn register(&mut self, phase: Phase, worker: Arc<dyn PhaseWorker>) {
        self.workers.insert(phase, worker);
    }

    pub fn get(&self, phase: Phase) -> Option<&Arc<dyn PhaseWorker>> {
        self.workers.get(&phase)
    }

    pub fn phases(&self) -> Vec<Phase> {
        let mut phases: Vec<_> = self.workers.keys().copied().collect();
        phases.sort();
        phases
    }
}

/// What a phase worker reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum WorkerSignal {
    /// The worker believes its output is ready; metrics are computed by the
    /// phase's detector when the worker does not supply them
    ReadyForNextPhase {
        #[serde(default)]
        metrics: Option<ProgressSnapshot>,
    },
    Completed,
    Failed {
        attempt_count: u32,
        #[serde(default)]
        error: Option<String>,
    },
    /// Progress report; the snapshot replaces the stored one for its phase
    Progress { snapshot: ProgressSnapshot },
}

/// A signal tagged with the worker that sent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSignal {
    pub workflow_id: WorkflowId,
    /// Phase of the sending worker, used to drop stale signals
    pub phase: Phase,
    pub signal: WorkerSignal,
}

impl PhaseSignal {
    pub fn new(workflow_id: WorkflowId, phase: Phase, signal: WorkerSignal) -> Self {
        Self {
            workflow_id,
            phase,
            signal,
        }
    }
}

#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("remediation rejected: {0}")]
    Rejected(String),

    #[error("remediation unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationRequest {
    pub workflow_id: WorkflowId,
    pub phase: Phase,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub requested_at: DateTime<Utc>,
}

/// External collaborator that takes over after repeated worker failures
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RemediationCollaborator: Send + Sync {
    async fn remediate(&self, request: RemediationRequest) -> Result<(), RemediationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_wire_format() {
        let json = r#"{"workflow_id":"wf-1","phase":"building","signal":{"signal":"failed","attempt_count":3}}"#;
        let signal: PhaseSignal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.phase, Phase::Building);
        assert_eq!(
            signal.signal,
            WorkerSignal::Failed {
                attempt_count: 3,
                error: None
            }
        );
    }

    #[tokio::test]
    async fn test_registry_looks_up_by_phase() {
        let mut worker = MockPhaseWorker::new();
        worker.expect_stop().times(1).returning(|_| Ok(()));

        let registry = WorkerRegistry::new().with_worker(Phase::Building, Arc::new(worker));
        assert!(registry.get(Phase::Ideation).is_none());
        assert_eq!(registry.phases(), vec![Phase::Building]);

        registry
            .get(Phase::Building)
            .unwrap()
            .stop(&WorkflowId::new("wf-1"))
            .await
            .unwrap();
    }
}
