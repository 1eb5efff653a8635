use async_trait::async_trait;
use thiserror::Error;

use crate::handoff::{HandoffBundle, PhaseArtifacts};
use crate::workflow::{Phase, PhaseProgress, ProgressSnapshot, TransitionRecord, WorkflowId, WorkflowInstance};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Errors that can occur in a durable phase store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workflow {0} already exists")]
    AlreadyExists(WorkflowId),

    #[error("Workflow id '{0}' cannot be used as a storage key")]
    InvalidId(String),

    #[error("State corruption detected: {reason}")]
    Corrupted { reason: String },

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable key/row store behind the phase state registry.
///
/// Layout: one record per workflow instance, an append-only transition log, the
/// latest progress snapshot and artifacts per `(workflow, phase)`, and every
/// handoff bundle ever built.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// Store a new workflow instance; fails with `AlreadyExists` on a duplicate id
    async fn insert_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    async fn load_instance(&self, workflow_id: &WorkflowId) -> Result<Option<WorkflowInstance>, StoreError>;

    /// Overwrite the instance record
    async fn save_instance(&self, instance: &WorkflowInstance) -> Result<(), StoreError>;

    async fn list_instances(&self) -> Result<Vec<WorkflowInstance>, StoreError>;

    async fn append_transition(&self, record: &TransitionRecord) -> Result<(), StoreError>;

    /// Transition records of a workflow, oldest first
    async fn transitions(&self, workflow_id: &WorkflowId) -> Result<Vec<TransitionRecord>, StoreError>;

    /// Replace the snapshot stored for the snapshot's `(workflow, phase)`
    async fn save_progress(&self, snapshot: &ProgressSnapshot) -> Result<(), StoreError>;

    async fn load_progress(&self, workflow_id: &WorkflowId) -> Result<PhaseProgress, StoreError>;

    async fn save_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
        artifacts: &PhaseArtifacts,
    ) -> Result<(), StoreError>;

    async fn load_artifacts(
        &self,
        workflow_id: &WorkflowId,
        phase: Phase,
    ) -> Result<Option<PhaseArtifacts>, StoreError>;

    async fn save_handoff(&self, bundle: &HandoffBundle) -> Result<(), StoreError>;

    /// Handoff bundles of a workflow, oldest first
    async fn handoffs(&self, workflow_id: &WorkflowId) -> Result<Vec<HandoffBundle>, StoreError>;
}
