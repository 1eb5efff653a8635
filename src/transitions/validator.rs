// Transition Validator - structural and domain guards over a proposed phase change
//
// Both checks are pure: they read the instance and its progress snapshots and never
// touch storage, workers or the event bus.

use serde::{Deserialize, Serialize};

use crate::config::PrerequisiteConfig;
use crate::workflow::{Phase, PhaseProgress, WorkflowInstance};

/// Static directed adjacency table. No phase lists itself.
const ADJACENCY: &[(Phase, &[Phase])] = &[
    (
        Phase::Ideation,
        &[Phase::IdeationReady, Phase::Paused, Phase::Failed],
    ),
    (
        Phase::IdeationReady,
        &[Phase::Specification, Phase::Ideation, Phase::Paused],
    ),
    (
        Phase::Specification,
        &[Phase::SpecReady, Phase::Paused, Phase::Failed],
    ),
    (
        Phase::SpecReady,
        &[Phase::Building, Phase::Specification, Phase::Paused],
    ),
    (
        Phase::Building,
        &[Phase::BuildReview, Phase::Paused, Phase::Failed],
    ),
    (
        Phase::BuildReview,
        &[Phase::Deployed, Phase::Building, Phase::Paused, Phase::Failed],
    ),
    (Phase::Deployed, &[]),
    (
        Phase::Paused,
        &[
            Phase::Ideation,
            Phase::IdeationReady,
            Phase::Specification,
            Phase::SpecReady,
            Phase::Building,
            Phase::BuildReview,
        ],
    ),
    (
        Phase::Failed,
        &[Phase::Ideation, Phase::Specification, Phase::Building],
    ),
];

/// Targets structurally reachable from `from`
pub fn allowed_targets(from: Phase) -> &'static [Phase] {
    ADJACENCY
        .iter()
        .find(|(phase, _)| *phase == from)
        .map(|(_, targets)| *targets)
        .unwrap_or(&[])
}

/// Pure lookup in the adjacency table.
pub fn can_transition(from: Phase, to: Phase) -> bool {
    allowed_targets(from).contains(&to)
}

/// Result of the domain guards. Not an error: failures are frequent and shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteCheck {
    pub met: bool,
    pub missing: Vec<String>,
}

impl PrerequisiteCheck {
    fn from_missing(missing: Vec<String>) -> Self {
        Self {
            met: missing.is_empty(),
            missing,
        }
    }
}

/// A structurally reachable target and what still blocks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOption {
    pub phase: Phase,
    pub check: PrerequisiteCheck,
}

#[derive(Debug, Clone)]
pub struct TransitionValidator {
    thresholds: PrerequisiteConfig,
}

impl Default for TransitionValidator {
    fn default() -> Self {
        Self::new(PrerequisiteConfig::default())
    }
}

impl TransitionValidator {
    pub fn new(thresholds: PrerequisiteConfig) -> Self {
        Self { thresholds }
    }

    pub fn can_transition(&self, from: Phase, to: Phase) -> bool {
        can_transition(from, to)
    }

    /// Domain guards layered on top of structural reachability.
    pub fn check_prerequisites(
        &self,
        instance: &WorkflowInstance,
        progress: &PhaseProgress,
        target: Phase,
    ) -> PrerequisiteCheck {
        let current = instance.current_phase;
        let mut missing = Vec::new();

        // Resume goes back to exactly where the workflow was paused; the target's
        // own guards were satisfied when it was first entered.
        if current == Phase::Paused {
            match instance.previous_phase {
                Some(previous) if previous == target => {}
                Some(previous) => missing.push(format!(
                    "a paused workflow can only resume to {}, not {}",
                    previous, target
                )),
                None => missing.push("paused workflow has no phase to resume to".to_string()),
            }
            return PrerequisiteCheck::from_missing(missing);
        }

        match target {
            Phase::IdeationReady => match progress.get(Phase::Ideation) {
                Some(ideation) => {
                    let min = self.thresholds.min_ideation_completion;
                    if ideation.completion_score < min {
                        missing.push(format!(
                            "ideation completion score {:.2} is below the minimum {:.2}",
                            ideation.completion_score, min
                        ));
                    }
                    let max = self.thresholds.max_ideation_blockers;
                    if ideation.blocker_count > max {
                        missing.push(format!(
                            "ideation has {} open blockers, at most {} allowed",
                            ideation.blocker_count, max
                        ));
                    }
                }
                None => missing.push(not_reported(Phase::Ideation)),
            },
            Phase::Specification => {
                if !matches!(current, Phase::IdeationReady | Phase::Failed) {
                    missing.push(format!(
                        "specification can only start from ideation_ready, current phase is {}",
                        current
                    ));
                }
            }
            Phase::SpecReady => match progress.get(Phase::Specification) {
                Some(spec) => {
                    if spec.pending_questions > 0 {
                        missing.push(format!(
                            "{} clarifying questions are still pending",
                            spec.pending_questions
                        ));
                    }
                    if spec.generated_tasks == 0 {
                        missing.push("no units of work have been generated".to_string());
                    }
                }
                None => missing.push(not_reported(Phase::Specification)),
            },
            Phase::Building => match progress.get(Phase::Specification) {
                Some(spec) if spec.generated_tasks > 0 => {}
                Some(_) => missing.push("building requires at least one generated unit of work".to_string()),
                None => missing.push(not_reported(Phase::Specification)),
            },
            Phase::BuildReview => match progress.get(Phase::Building) {
                Some(build) => {
                    let min = self.thresholds.min_build_completion;
                    if build.completion_score < min {
                        missing.push(format!(
                            "building completion score {:.2} is below the minimum {:.2}",
                            build.completion_score, min
                        ));
                    }
                }
                None => missing.push(not_reported(Phase::Building)),
            },
            Phase::Deployed => {
                if current != Phase::BuildReview {
                    missing.push(format!(
                        "deployment requires build_review, current phase is {}",
                        current
                    ));
                }
                match progress.get(Phase::Building) {
                    Some(build) if build.failed_tasks > 0 => missing.push(format!(
                        "{} units of work failed during building",
                        build.failed_tasks
                    )),
                    Some(_) => {}
                    None => missing.push(not_reported(Phase::Building)),
                }
            }
            Phase::Ideation | Phase::Paused | Phase::Failed => {}
        }

        PrerequisiteCheck::from_missing(missing)
    }

    /// Every structurally reachable target with its prerequisite outcome
    pub fn target_options(
        &self,
        instance: &WorkflowInstance,
        progress: &PhaseProgress,
    ) -> Vec<TargetOption> {
        allowed_targets(instance.current_phase)
            .iter()
            .map(|&phase| TargetOption {
                phase,
                check: self.check_prerequisites(instance, progress, phase),
            })
            .collect()
    }

    /// Targets an unforced request would currently be allowed to reach
    pub fn valid_targets(&self, instance: &WorkflowInstance, progress: &PhaseProgress) -> Vec<Phase> {
        self.target_options(instance, progress)
            .into_iter()
            .filter(|option| option.check.met)
            .map(|option| option.phase)
            .collect()
    }
}

fn not_reported(phase: Phase) -> String {
    format!("{} progress has not been reported", phase)
}
