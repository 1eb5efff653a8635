use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Phase, WorkflowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Committed,
    RolledBack,
    Rejected,
}

impl TransitionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionOutcome::Committed => "committed",
            TransitionOutcome::RolledBack => "rolled_back",
            TransitionOutcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for TransitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeringActor {
    /// The completion policy advanced the workflow on its own
    Auto,
    Human,
    System,
}

impl TriggeringActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggeringActor::Auto => "auto",
            TriggeringActor::Human => "human",
            TriggeringActor::System => "system",
        }
    }
}

impl fmt::Display for TriggeringActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit entry, one per transition attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: Uuid,
    pub workflow_id: WorkflowId,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: TransitionOutcome,
    pub triggering_actor: TriggeringActor,
    /// Structural and domain guards were bypassed
    pub forced: bool,
    /// Why the attempt did not commit
    pub detail: Option<String>,
}

impl TransitionRecord {
    pub fn new(
        workflow_id: WorkflowId,
        from_phase: Phase,
        to_phase: Phase,
        reason: impl Into<String>,
        outcome: TransitionOutcome,
        triggering_actor: TriggeringActor,
        forced: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            from_phase,
            to_phase,
            reason: reason.into(),
            timestamp: Utc::now(),
            outcome,
            triggering_actor,
            forced,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == TransitionOutcome::Committed
    }
}
