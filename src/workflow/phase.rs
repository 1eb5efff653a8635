use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of phases a workflow instance can be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Initial phase: the idea is being explored with the ideation worker
    Ideation,
    /// Ideation produced enough material; waiting to enter specification
    IdeationReady,
    Specification,
    /// Specification is complete; waiting to enter building
    SpecReady,
    Building,
    /// Build output is waiting for review before deployment
    BuildReview,
    /// Terminal phase; the workflow is archived here
    Deployed,
    Paused,
    Failed,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::Ideation,
        Phase::IdeationReady,
        Phase::Specification,
        Phase::SpecReady,
        Phase::Building,
        Phase::BuildReview,
        Phase::Deployed,
        Phase::Paused,
        Phase::Failed,
    ];

    /// Phase every new workflow instance starts in.
    pub const INITIAL: Phase = Phase::Ideation;

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Ideation => "ideation",
            Phase::IdeationReady => "ideation_ready",
            Phase::Specification => "specification",
            Phase::SpecReady => "spec_ready",
            Phase::Building => "building",
            Phase::BuildReview => "build_review",
            Phase::Deployed => "deployed",
            Phase::Paused => "paused",
            Phase::Failed => "failed",
        }
    }

    /// Phases a workflow can be paused from.
    pub fn is_active(&self) -> bool {
        !matches!(self, Phase::Deployed | Phase::Paused | Phase::Failed)
    }

    /// Phases in which a worker is doing substantive work and can fail.
    pub fn is_working(&self) -> bool {
        matches!(
            self,
            Phase::Ideation | Phase::Specification | Phase::Building | Phase::BuildReview
        )
    }

    /// Work phases a failed workflow may be retried into.
    pub fn is_retry_target(&self) -> bool {
        matches!(self, Phase::Ideation | Phase::Specification | Phase::Building)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Deployed)
    }

    /// Whether an external phase worker owns this phase.
    pub fn has_worker(&self) -> bool {
        matches!(
            self,
            Phase::Ideation | Phase::Specification | Phase::Building | Phase::Deployed
        )
    }

    /// The worker phase whose accumulated knowledge initializes this phase's worker.
    /// `None` for the initial phase and for phases without a worker.
    pub fn handoff_source(&self) -> Option<Phase> {
        match self {
            Phase::Specification => Some(Phase::Ideation),
            Phase::Building => Some(Phase::Specification),
            Phase::Deployed => Some(Phase::Building),
            _ => None,
        }
    }

    /// The phase a worker's "output ready" signal proposes to advance to.
    pub fn ready_target(&self) -> Option<Phase> {
        match self {
            Phase::Ideation => Some(Phase::IdeationReady),
            Phase::Specification => Some(Phase::SpecReady),
            Phase::Building => Some(Phase::BuildReview),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Phase::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == normalized)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}
