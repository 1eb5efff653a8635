use anyhow::Result;
use clap::Parser;

mod cli;

use cli::commands::{
    artifacts::ArtifactsCommand, config_show::ConfigCommand, handoffs::HandoffsCommand, history::HistoryCommand,
    init::InitCommand, progress::ProgressCommand, status::StatusCommand, targets::TargetsCommand,
    transition::{PauseCommand, TransitionCommand},
    Command,
};
use cli::{Cli, Commands};
use phase_pipeline::{config, init_telemetry};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut observability = config()?.observability.clone();
    if cli.verbose {
        observability.log_level = "debug".to_string();
    }
    init_telemetry(&observability)?;

    tokio::runtime::Runtime::new()?.block_on(async {
        match cli.command {
            // Default behavior: no subcommand lists every workflow
            None => StatusCommand::new(None).execute().await,
            Some(Commands::Init {
                id,
                auto_advance,
                human_review,
            }) => {
                InitCommand::new(id)
                    .with_auto_advance(auto_advance)
                    .with_human_review(human_review)
                    .execute()
                    .await
            }
            Some(Commands::Status { workflow_id }) => StatusCommand::new(workflow_id).execute().await,
            Some(Commands::Targets { workflow_id }) => TargetsCommand::new(workflow_id).execute().await,
            Some(Commands::Transition {
                workflow_id,
                target,
                reason,
                force,
            }) => {
                TransitionCommand::new(workflow_id, target, reason)
                    .with_force(force)
                    .execute()
                    .await
            }
            Some(Commands::Pause { workflow_id, reason }) => PauseCommand::pause(workflow_id, reason).execute().await,
            Some(Commands::Resume { workflow_id, reason }) => {
                PauseCommand::resume(workflow_id, reason).execute().await
            }
            Some(Commands::History { workflow_id, limit }) => {
                HistoryCommand::new(workflow_id).with_limit(limit).execute().await
            }
            Some(Commands::Progress { workflow_id, analyze }) => {
                ProgressCommand::new(workflow_id, analyze).execute().await
            }
            Some(Commands::Artifacts {
                workflow_id,
                phase,
                file,
            }) => ArtifactsCommand::new(workflow_id, phase, file).execute().await,
            Some(Commands::Handoffs { workflow_id }) => HandoffsCommand::new(workflow_id).execute().await,
            Some(Commands::Config { output }) => ConfigCommand::new(output).execute().await,
        }
    })
}
