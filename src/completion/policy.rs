use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::workflow::{Phase, ProgressSnapshot, WorkflowInstance};

/// What to do when a phase worker says its output is ready
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AdvanceDecision {
    /// Ask the executor to move on without a human
    AutoAdvance { target: Phase },
    /// Publish a `transition_available` advisory and wait for an actor
    NotifyAvailable { target: Phase },
    /// Nothing to propose
    Hold { reason: String },
}

/// Swappable rule deciding between automatic advance and advisory
pub trait AdvancePolicy: Send + Sync {
    fn decide(&self, instance: &WorkflowInstance, metrics: &ProgressSnapshot) -> AdvanceDecision;
}

/// Auto-advance when the workflow allows it and confidence clears the phase threshold
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    thresholds: CompletionConfig,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(CompletionConfig::default())
    }
}

impl ThresholdPolicy {
    pub fn new(thresholds: CompletionConfig) -> Self {
        Self { thresholds }
    }

    pub fn threshold(&self, phase: Phase) -> Option<f64> {
        match phase {
            Phase::Ideation => Some(self.thresholds.ideation_threshold),
            Phase::Specification => Some(self.thresholds.specification_threshold),
            Phase::Building => Some(self.thresholds.building_threshold),
            _ => None,
        }
    }
}

impl AdvancePolicy for ThresholdPolicy {
    fn decide(&self, instance: &WorkflowInstance, metrics: &ProgressSnapshot) -> AdvanceDecision {
        if instance.current_phase != metrics.phase {
            return AdvanceDecision::Hold {
                reason: format!(
                    "metrics are for {} but the workflow is in {}",
                    metrics.phase, instance.current_phase
                ),
            };
        }

        let (Some(target), Some(threshold)) = (metrics.phase.ready_target(), self.threshold(metrics.phase)) else {
            return AdvanceDecision::Hold {
                reason: format!("{} does not advance on readiness", metrics.phase),
            };
        };

        if instance.auto_advance && metrics.confidence >= threshold {
            AdvanceDecision::AutoAdvance { target }
        } else {
            AdvanceDecision::NotifyAvailable { target }
        }
    }
}
