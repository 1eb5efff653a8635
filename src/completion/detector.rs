// Completion detectors - readiness metrics computed from a phase's artifacts
//
// Each detector owns a fixed milestone checklist. Every milestone is worth
// exactly 1/N of the completion score; there is no partial credit.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use super::confidence::{estimate_confidence, ConfidenceEstimator};
use crate::handoff::{extract, PhaseArtifacts};
use crate::registry::{PhaseStore, StoreError};
use crate::workflow::{Phase, ProgressSnapshot, WorkflowId};

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("no completion detector exists for phase {0}")]
    UnsupportedPhase(Phase),

    #[error("failed to read phase artifacts: {0}")]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait ReadinessAnalyzer: Send + Sync {
    fn phase(&self) -> Phase;

    async fn analyze_readiness(&self, workflow_id: &WorkflowId) -> Result<ProgressSnapshot, DetectorError>;
}

pub struct Milestone {
    pub name: &'static str,
    check: fn(&PhaseArtifacts) -> bool,
}

impl Milestone {
    pub fn is_met(&self, artifacts: &PhaseArtifacts) -> bool {
        (self.check)(artifacts)
    }
}

const IDEATION_MILESTONES: &[Milestone] = &[
    Milestone {
        name: "problem_defined",
        check: |a| extract::resolve_problem(a).value.is_some(),
    },
    Milestone {
        name: "target_audience_identified",
        check: |a| extract::resolve_target_audience(a).value.is_some(),
    },
    Milestone {
        name: "requirements_captured",
        check: |a| !extract::resolve_requirements(a).value.is_empty(),
    },
    Milestone {
        name: "success_metrics_defined",
        check: |a| !extract::resolve_success_metrics(a).value.is_empty(),
    },
    Milestone {
        name: "key_entities_named",
        check: |a| !extract::resolve_entities(a).value.is_empty(),
    },
];

const SPECIFICATION_MILESTONES: &[Milestone] = &[
    Milestone {
        name: "requirements_documented",
        check: |a| !extract::resolve_requirements(a).value.is_empty(),
    },
    Milestone {
        name: "execution_plan_drafted",
        check: |a| !extract::resolve_execution_plan(a).value.is_empty(),
    },
    Milestone {
        name: "work_units_generated",
        check: |a| a.generated_tasks() > 0,
    },
    Milestone {
        name: "questions_resolved",
        check: |a| a.open_questions() == 0,
    },
];

const BUILDING_MILESTONES: &[Milestone] = &[
    Milestone {
        name: "work_units_generated",
        check: |a| a.generated_tasks() > 0,
    },
    Milestone {
        name: "all_work_units_executed",
        check: |a| a.generated_tasks() > 0 && a.executed_tasks() == a.generated_tasks(),
    },
    Milestone {
        name: "no_failed_work_units",
        check: |a| a.generated_tasks() > 0 && a.failed_tasks() == 0,
    },
];

/// The checklist for a source phase, if it has one
pub fn milestones(phase: Phase) -> Option<&'static [Milestone]> {
    match phase {
        Phase::Ideation => Some(IDEATION_MILESTONES),
        Phase::Specification => Some(SPECIFICATION_MILESTONES),
        Phase::Building => Some(BUILDING_MILESTONES),
        _ => None,
    }
}

/// Pure scoring of `artifacts` against the phase checklist
pub fn evaluate(
    phase: Phase,
    workflow_id: &WorkflowId,
    artifacts: &PhaseArtifacts,
    confidence: f64,
) -> Result<ProgressSnapshot, DetectorError> {
    let checklist = milestones(phase).ok_or(DetectorError::UnsupportedPhase(phase))?;
    let met: Vec<String> = checklist
        .iter()
        .filter(|milestone| milestone.is_met(artifacts))
        .map(|milestone| milestone.name.to_string())
        .collect();

    let open_questions = artifacts.open_questions() as u32;
    let mut snapshot = ProgressSnapshot::new(workflow_id.clone(), phase)
        .with_completion(met.len() as f64 / checklist.len() as f64)
        .with_confidence(confidence)
        .with_blockers(open_questions)
        .with_pending_questions(open_questions)
        .with_tasks(artifacts.generated_tasks() as u32, artifacts.failed_tasks() as u32);
    snapshot.interventions = artifacts.interventions;
    snapshot.milestones_met = met;
    snapshot.updated_at = Utc::now();
    Ok(snapshot)
}

/// Checklist detector reading the phase's artifacts from the store
pub struct MilestoneDetector {
    phase: Phase,
    store: Arc<dyn PhaseStore>,
    estimator: Option<Arc<dyn ConfidenceEstimator>>,
    default_confidence: f64,
}

impl MilestoneDetector {
    pub fn new(phase: Phase, store: Arc<dyn PhaseStore>) -> Result<Self, DetectorError> {
        if milestones(phase).is_none() {
            return Err(DetectorError::UnsupportedPhase(phase));
        }
        Ok(Self {
            phase,
            store,
            estimator: None,
            default_confidence: 0.5,
        })
    }

    pub fn with_estimator(mut self, estimator: Arc<dyn ConfidenceEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn with_default_confidence(mut self, default_confidence: f64) -> Self {
        self.default_confidence = default_confidence.clamp(0.0, 1.0);
        self
    }
}

#[async_trait]
impl ReadinessAnalyzer for MilestoneDetector {
    fn phase(&self) -> Phase {
        self.phase
    }

    async fn analyze_readiness(&self, workflow_id: &WorkflowId) -> Result<ProgressSnapshot, DetectorError> {
        let artifacts = self
            .store
            .load_artifacts(workflow_id, self.phase)
            .await?
            .unwrap_or_default();

        let confidence = match &self.estimator {
            Some(estimator) => {
                estimate_confidence(estimator.as_ref(), self.phase, &artifacts, self.default_confidence).await
            }
            None => self.default_confidence,
        };

        let snapshot = evaluate(self.phase, workflow_id, &artifacts, confidence)?;
        debug!(
            workflow_id = %workflow_id,
            phase = %self.phase,
            completion = snapshot.completion_score,
            confidence = snapshot.confidence,
            blockers = snapshot.blocker_count,
            "Readiness analyzed"
        );
        Ok(snapshot)
    }
}
