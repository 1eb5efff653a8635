use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Phase, WorkflowId};

/// Readiness metrics reported for one phase of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub workflow_id: WorkflowId,
    pub phase: Phase,
    /// Fraction of the phase's milestones that are met, 0..=1
    pub completion_score: f64,
    /// 0..=1
    pub confidence: f64,
    pub blocker_count: u32,
    pub pending_questions: u32,
    pub generated_tasks: u32,
    pub failed_tasks: u32,
    pub interventions: u32,
    #[serde(default)]
    pub milestones_met: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(workflow_id: WorkflowId, phase: Phase) -> Self {
        Self {
            workflow_id,
            phase,
            completion_score: 0.0,
            confidence: 0.0,
            blocker_count: 0,
            pending_questions: 0,
            generated_tasks: 0,
            failed_tasks: 0,
            interventions: 0,
            milestones_met: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_completion(mut self, completion_score: f64) -> Self {
        self.completion_score = unit_interval(completion_score);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = unit_interval(confidence);
        self
    }

    pub fn with_blockers(mut self, blocker_count: u32) -> Self {
        self.blocker_count = blocker_count;
        self
    }

    pub fn with_pending_questions(mut self, pending_questions: u32) -> Self {
        self.pending_questions = pending_questions;
        self
    }

    pub fn with_tasks(mut self, generated: u32, failed: u32) -> Self {
        self.generated_tasks = generated;
        self.failed_tasks = failed;
        self
    }

    /// Scores pulled back into 0..=1; deserialized snapshots skip the builders
    pub fn clamped(mut self) -> Self {
        self.completion_score = unit_interval(self.completion_score);
        self.confidence = unit_interval(self.confidence);
        self
    }

    pub fn is_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.completion_score) && (0.0..=1.0).contains(&self.confidence)
    }
}

// NaN counts as no evidence
fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// All progress snapshots of one workflow, keyed by phase.
///
/// A phase with no entry has not been started.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    snapshots: BTreeMap<Phase, ProgressSnapshot>,
}

impl PhaseProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, phase: Phase) -> Option<&ProgressSnapshot> {
        self.snapshots.get(&phase)
    }

    pub fn is_started(&self, phase: Phase) -> bool {
        self.snapshots.contains_key(&phase)
    }

    /// Insert or replace the snapshot for its phase
    pub fn record(&mut self, snapshot: ProgressSnapshot) {
        self.snapshots.insert(snapshot.phase, snapshot);
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &ProgressSnapshot> {
        self.snapshots.values()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl FromIterator<ProgressSnapshot> for PhaseProgress {
    fn from_iter<T: IntoIterator<Item = ProgressSnapshot>>(iter: T) -> Self {
        let mut progress = PhaseProgress::new();
        for snapshot in iter {
            progress.record(snapshot);
        }
        progress
    }
}
