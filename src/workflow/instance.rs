use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::Phase;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh identifier for a workflow created at intake
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl PartialEq<str> for WorkflowId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Current state of one end-to-end run of the pipeline.
///
/// Only the transition executor mutates an instance after intake. Instances are
/// never deleted; a finished workflow stays in [`Phase::Deployed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowId,
    pub current_phase: Phase,
    pub previous_phase: Option<Phase>,
    pub last_transition_at: Option<DateTime<Utc>>,
    pub transition_reason: Option<String>,
    pub auto_advance: bool,
    pub human_review_required: bool,
    pub created_at: DateTime<Utc>,
    /// Bumped on every committed transition
    #[serde(default)]
    pub revision: u64,
}

impl WorkflowInstance {
    pub fn new(id: WorkflowId) -> Self {
        Self {
            id,
            current_phase: Phase::INITIAL,
            previous_phase: None,
            last_transition_at: None,
            transition_reason: None,
            auto_advance: false,
            human_review_required: false,
            created_at: Utc::now(),
            revision: 0,
        }
    }

    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn with_human_review(mut self, required: bool) -> Self {
        self.human_review_required = required;
        self
    }

    /// Returns a copy of this instance moved to `target`.
    pub(crate) fn transitioned(&self, target: Phase, reason: &str) -> Self {
        let mut next = self.clone();
        next.previous_phase = Some(self.current_phase);
        next.current_phase = target;
        next.last_transition_at = Some(Utc::now());
        next.transition_reason = Some(reason.to_string());
        next.revision = self.revision + 1;
        next
    }

    /// The phase `resume` returns to, if the workflow is paused.
    pub fn resume_target(&self) -> Option<Phase> {
        if self.current_phase == Phase::Paused {
            self.previous_phase
        } else {
            None
        }
    }
}
