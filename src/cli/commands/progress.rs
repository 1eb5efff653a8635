use anyhow::Result;
use phase_pipeline::{Phase, ProgressSnapshot, WorkflowId};

use super::{phase_icon, with_coordinator, Command};

pub struct ProgressCommand {
    pub workflow_id: String,
    pub analyze: Option<Phase>,
}

impl ProgressCommand {
    pub fn new(workflow_id: String, analyze: Option<Phase>) -> Self {
        Self { workflow_id, analyze }
    }
}

impl Command for ProgressCommand {
    async fn execute(&self) -> Result<()> {
        let id = WorkflowId::new(self.workflow_id.clone());
        let analyze = self.analyze;

        with_coordinator(|coordinator| async move {
            if let Some(phase) = analyze {
                print!("🔄 Analyzing {} readiness... ", phase);
                std::io::Write::flush(&mut std::io::stdout())?;
                let snapshot = coordinator.analyze(&id, phase).await?;
                println!("✅");
                print_snapshot(&snapshot);
                return Ok(());
            }

            let progress = coordinator.progress(&id).await?;
            if progress.is_empty() {
                println!("📈 No progress reported for {}", id);
                return Ok(());
            }
            for snapshot in progress.snapshots() {
                print_snapshot(snapshot);
            }
            Ok(())
        })
        .await
    }
}

fn print_snapshot(snapshot: &ProgressSnapshot) {
    println!();
    println!("{} {}", phase_icon(snapshot.phase), snapshot.phase);
    println!("   📊 Completion: {:.0}%", snapshot.completion_score * 100.0);
    println!("   🎯 Confidence: {:.2}", snapshot.confidence);
    println!(
        "   🚧 Blockers: {} | ❓ Pending questions: {}",
        snapshot.blocker_count, snapshot.pending_questions
    );
    println!(
        "   🧩 Work units: {} generated, {} failed",
        snapshot.generated_tasks, snapshot.failed_tasks
    );
    if !snapshot.milestones_met.is_empty() {
        println!("   ✅ Milestones: {}", snapshot.milestones_met.join(", "));
    }
    println!("   🕐 Updated: {}", snapshot.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
}
