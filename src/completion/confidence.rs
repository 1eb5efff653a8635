use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::handoff::PhaseArtifacts;
use crate::workflow::Phase;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("confidence estimator unavailable: {0}")]
    Unavailable(String),

    #[error("confidence estimation failed: {0}")]
    Failed(String),
}

/// External reasoning collaborator asked how confident it is that a phase's
/// output is ready. It is instructed to answer with a single number in [0, 1].
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ConfidenceEstimator: Send + Sync {
    /// Raw, unparsed answer
    async fn estimate(&self, phase: Phase, artifacts: &PhaseArtifacts) -> Result<String, EstimatorError>;
}

/// Accepts only a bare finite number within [0, 1]
pub fn parse_confidence(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && (0.0..=1.0).contains(value))
}

/// Ask the estimator, falling back to `default` on errors and unusable answers
pub async fn estimate_confidence(
    estimator: &dyn ConfidenceEstimator,
    phase: Phase,
    artifacts: &PhaseArtifacts,
    default: f64,
) -> f64 {
    match estimator.estimate(phase, artifacts).await {
        Ok(raw) => parse_confidence(&raw).unwrap_or_else(|| {
            warn!(phase = %phase, raw = %raw, default, "Unparseable confidence, using default");
            default
        }),
        Err(e) => {
            warn!(phase = %phase, error = %e, default, "Confidence estimator failed, using default");
            default
        }
    }
}
