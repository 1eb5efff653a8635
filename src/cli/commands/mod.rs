use anyhow::{Context, Result};
use phase_pipeline::{config, open_store, Phase, PipelineCoordinator, WorkerRegistry};

pub mod artifacts;
pub mod config_show;
pub mod handoffs;
pub mod history;
pub mod init;
pub mod progress;
pub mod status;
pub mod targets;
pub mod transition;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

/// Open the configured store and hand a coordinator to `f`.
///
/// Phase workers run elsewhere, so the command line coordinator has none registered.
pub async fn with_coordinator<F, Fut, R>(f: F) -> Result<R>
where
    F: FnOnce(PipelineCoordinator) -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    let config = config()?;
    let store = open_store(&config.storage)
        .await
        .with_context(|| format!("Failed to open the {:?} workflow store", config.storage.backend))?;
    f(PipelineCoordinator::from_config(store, WorkerRegistry::new(), None, config)).await
}

pub fn phase_icon(phase: Phase) -> &'static str {
    match phase {
        Phase::Ideation => "💡",
        Phase::IdeationReady | Phase::SpecReady => "🟡",
        Phase::Specification => "📝",
        Phase::Building => "🔨",
        Phase::BuildReview => "🔍",
        Phase::Deployed => "🚀",
        Phase::Paused => "⏸️ ",
        Phase::Failed => "❌",
    }
}
