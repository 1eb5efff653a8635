//! Completion detection: per-phase readiness metrics and the advance policy
//! applied when a phase worker reports its output is ready.

pub mod confidence;
pub mod detector;
pub mod policy;

pub use confidence::{estimate_confidence, parse_confidence, ConfidenceEstimator, EstimatorError};
pub use detector::{evaluate, milestones, DetectorError, Milestone, MilestoneDetector, ReadinessAnalyzer};
pub use policy::{AdvanceDecision, AdvancePolicy, ThresholdPolicy};

#[cfg(any(test, feature = "testing"))]
pub use confidence::MockConfidenceEstimator;

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CompletionConfig;
use crate::registry::PhaseStore;
use crate::workflow::Phase;

/// One checklist detector for each phase that has one
pub fn standard_detectors(
    store: Arc<dyn PhaseStore>,
    estimator: Option<Arc<dyn ConfidenceEstimator>>,
    config: &CompletionConfig,
) -> HashMap<Phase, Arc<dyn ReadinessAnalyzer>> {
    Phase::ALL
        .into_iter()
        .filter_map(|phase| {
            let detector = MilestoneDetector::new(phase, store.clone())
                .ok()?
                .with_default_confidence(config.default_confidence);
            let detector = match &estimator {
                Some(estimator) => detector.with_estimator(estimator.clone()),
                None => detector,
            };
            Some((phase, Arc::new(detector) as Arc<dyn ReadinessAnalyzer>))
        })
        .collect()
}
