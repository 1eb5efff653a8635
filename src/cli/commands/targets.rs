use anyhow::Result;
use phase_pipeline::WorkflowId;

use super::{phase_icon, with_coordinator, Command};

pub struct TargetsCommand {
    pub workflow_id: String,
}

impl TargetsCommand {
    pub fn new(workflow_id: String) -> Self {
        Self { workflow_id }
    }
}

impl Command for TargetsCommand {
    async fn execute(&self) -> Result<()> {
        let id = WorkflowId::new(self.workflow_id.clone());
        with_coordinator(|coordinator| async move {
            let current = coordinator.current_phase(&id).await?;
            let options = coordinator.target_options(&id).await?;

            println!("🧭 Targets from {} {}", phase_icon(current), current);
            println!("─────────────────────────────");
            if options.is_empty() {
                println!("🏁 {} is terminal; no further transitions", current);
                return Ok(());
            }

            for option in &options {
                if option.check.met {
                    println!(" 🟢 {}", option.phase);
                } else {
                    println!(" 🔴 {}", option.phase);
                    for reason in &option.check.missing {
                        println!("    • {}", reason);
                    }
                }
            }
            println!();
            println!("💡 Blocked targets can still be reached with --force (recorded in the audit log)");
            Ok(())
        })
        .await
    }
}
