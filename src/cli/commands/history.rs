use anyhow::Result;
use phase_pipeline::{TransitionOutcome, WorkflowId};

use super::{with_coordinator, Command};

pub struct HistoryCommand {
    pub workflow_id: String,
    pub limit: Option<usize>,
}

impl HistoryCommand {
    pub fn new(workflow_id: String) -> Self {
        Self {
            workflow_id,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

impl Command for HistoryCommand {
    async fn execute(&self) -> Result<()> {
        let id = WorkflowId::new(self.workflow_id.clone());
        let limit = self.limit;

        with_coordinator(|coordinator| async move {
            let records = coordinator.history(&id).await?;
            println!("📜 Transition log for {}", id);
            println!("─────────────────────────────");
            if records.is_empty() {
                println!("   No transitions recorded");
                return Ok(());
            }

            let skip = limit.map(|n| records.len().saturating_sub(n)).unwrap_or(0);
            for record in records.iter().skip(skip) {
                let icon = match record.outcome {
                    TransitionOutcome::Committed => "✅",
                    TransitionOutcome::Rejected => "🚫",
                    TransitionOutcome::RolledBack => "↩️ ",
                };
                println!(
                    "{} {} {} → {} by {}{}",
                    icon,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.from_phase,
                    record.to_phase,
                    record.triggering_actor,
                    if record.forced { " [forced]" } else { "" }
                );
                println!("   📝 {}", record.reason);
                if let Some(detail) = &record.detail {
                    println!("   ⚠️  {}", detail);
                }
            }
            Ok(())
        })
        .await
    }
}
