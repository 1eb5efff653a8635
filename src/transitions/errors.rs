use thiserror::Error;

use crate::registry::StoreError;
use crate::workflow::{Phase, WorkflowId};

/// Why a transition request did not commit.
///
/// On every variant the workflow's current phase is unchanged from the caller's
/// point of view: either it was never mutated, or the executor rolled it back.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("Cannot move from {from} to {to}: not a permitted transition")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Cannot move to {target} yet: {}", missing.join("; "))]
    PrerequisiteNotMet { target: Phase, missing: Vec<String> },

    #[error("Transition aborted by hook '{hook}': {reason}")]
    HookFailure { hook: String, reason: String },

    #[error("Could not save the transition, phase restored: {cause}")]
    PersistenceFailure { cause: String },

    /// `phase` is the worker that failed: the target on start, the previous phase on stop
    #[error("The {phase} worker failed during the handoff, phase restored: {cause}")]
    WorkerStartFailure { phase: Phase, cause: String },

    #[error("A transition is already in progress for workflow {workflow_id}")]
    ConcurrentTransitionConflict { workflow_id: WorkflowId },

    #[error("Workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: WorkflowId },

    #[error("Workflow {workflow_id} is not paused (current phase: {phase})")]
    NotPaused { workflow_id: WorkflowId, phase: Phase },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl TransitionError {
    /// Stable machine-readable code for UIs and API clients
    pub fn reason_code(&self) -> &'static str {
        match self {
            TransitionError::InvalidTransition { .. } => "invalid_transition",
            TransitionError::PrerequisiteNotMet { .. } => "prerequisite_not_met",
            TransitionError::HookFailure { .. } => "hook_failure",
            TransitionError::PersistenceFailure { .. } => "persistence_failure",
            TransitionError::WorkerStartFailure { .. } => "worker_start_failure",
            TransitionError::ConcurrentTransitionConflict { .. } => "transition_in_progress",
            TransitionError::WorkflowNotFound { .. } => "workflow_not_found",
            TransitionError::NotPaused { .. } => "not_paused",
            TransitionError::Store(_) => "storage_error",
        }
    }

    /// Whether the attempt got far enough to mutate state and had to be rolled back
    pub fn was_rolled_back(&self) -> bool {
        matches!(
            self,
            TransitionError::PersistenceFailure { .. } | TransitionError::WorkerStartFailure { .. }
        )
    }
}
