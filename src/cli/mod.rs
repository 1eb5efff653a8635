use clap::{Parser, Subcommand};
use std::path::PathBuf;

use phase_pipeline::Phase;

pub mod commands;

#[derive(Parser)]
#[command(name = "phase-pipeline")]
#[command(about = "Guarded, auditable phase transitions for idea-to-deployment workflows")]
#[command(long_about = "Phase pipeline moves each workflow through ideation, specification, building and \
                       deployment. Every transition is validated, persisted and recorded in an audit log. \
                       Get started with 'phase-pipeline init' to register a workflow.")]
pub struct Cli {
    /// Log at debug level regardless of configuration
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a new workflow in the initial phase
    Init {
        /// Workflow identifier (generated when omitted)
        #[arg(long)]
        id: Option<String>,
        /// Let the completion policy advance the workflow without a human
        #[arg(long, help = "Advance automatically when confidence clears the phase threshold")]
        auto_advance: bool,
        /// Require a human actor for every transition out of a ready phase
        #[arg(long, help = "Reject automatic transitions out of ideation_ready, spec_ready and build_review")]
        human_review: bool,
    },
    /// Show one workflow in detail, or every workflow when no id is given
    Status {
        workflow_id: Option<String>,
    },
    /// List reachable target phases and what still blocks each one
    Targets {
        workflow_id: String,
    },
    /// Request a transition to another phase
    Transition {
        workflow_id: String,
        /// Target phase, e.g. ideation_ready or specification
        target: Phase,
        #[arg(long, default_value = "requested from the command line")]
        reason: String,
        /// Skip validation; the audit record is flagged as forced
        #[arg(long, help = "Bypass structural and domain guards (recorded as forced)")]
        force: bool,
    },
    /// Pause a workflow
    Pause {
        workflow_id: String,
        #[arg(long, default_value = "paused from the command line")]
        reason: String,
    },
    /// Resume a paused workflow in the phase it was paused from
    Resume {
        workflow_id: String,
        #[arg(long, default_value = "resumed from the command line")]
        reason: String,
    },
    /// Show the transition audit log of a workflow
    History {
        workflow_id: String,
        /// Only the most recent N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show progress snapshots, or re-run a phase's completion detector
    Progress {
        workflow_id: String,
        /// Run the detector for this phase and record the resulting snapshot
        #[arg(long)]
        analyze: Option<Phase>,
    },
    /// Import a phase's artifacts from a JSON file
    Artifacts {
        workflow_id: String,
        phase: Phase,
        file: PathBuf,
    },
    /// Show the handoff bundles produced for a workflow
    Handoffs {
        workflow_id: String,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Also write it to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },
}
