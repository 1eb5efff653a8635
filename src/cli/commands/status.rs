use anyhow::Result;
use phase_pipeline::{PipelineCoordinator, WorkflowId};

use super::{phase_icon, with_coordinator, Command};

pub struct StatusCommand {
    pub workflow_id: Option<String>,
}

impl StatusCommand {
    pub fn new(workflow_id: Option<String>) -> Self {
        Self { workflow_id }
    }
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let workflow_id = self.workflow_id.clone().map(WorkflowId::new);
        with_coordinator(|coordinator| async move {
            match workflow_id {
                Some(id) => show_workflow(&coordinator, &id).await,
                None => show_all(&coordinator).await,
            }
        })
        .await
    }
}

async fn show_all(coordinator: &PipelineCoordinator) -> Result<()> {
    println!("📊 PHASE PIPELINE STATUS");
    println!("========================");
    println!();

    let workflows = coordinator.list_workflows().await?;
    if workflows.is_empty() {
        println!("📋 No workflows registered");
        println!("   💡 Create one with: phase-pipeline init");
        return Ok(());
    }

    for instance in &workflows {
        println!(
            " {} {:<38} {:<15} rev {}",
            phase_icon(instance.current_phase),
            instance.id,
            instance.current_phase,
            instance.revision
        );
    }
    println!();
    println!("🎯 Total workflows: {}", workflows.len());
    Ok(())
}

async fn show_workflow(coordinator: &PipelineCoordinator, id: &WorkflowId) -> Result<()> {
    let instance = coordinator.instance(id).await?;
    let progress = coordinator.progress(id).await?;

    println!("📊 WORKFLOW {}", instance.id);
    println!("─────────────────────────────");
    println!(
        " {} Phase: {}{}",
        phase_icon(instance.current_phase),
        instance.current_phase,
        instance
            .previous_phase
            .map(|previous| format!(" (from {})", previous))
            .unwrap_or_default()
    );
    println!(" 🔢 Revision: {}", instance.revision);
    println!(" 🕐 Created: {}", instance.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let (Some(at), Some(reason)) = (&instance.last_transition_at, &instance.transition_reason) {
        println!(" 📝 Last transition: {} ({})", reason, at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!(
        " ⚙️  Auto-advance: {} | Human review: {}",
        if instance.auto_advance { "on" } else { "off" },
        if instance.human_review_required { "required" } else { "optional" }
    );
    println!();

    if progress.is_empty() {
        println!("📈 No progress reported yet");
    } else {
        println!("📈 PROGRESS:");
        for snapshot in progress.snapshots() {
            println!(
                "   {} {:<14} completion {:>3.0}% | confidence {:.2} | blockers {}",
                phase_icon(snapshot.phase),
                snapshot.phase,
                snapshot.completion_score * 100.0,
                snapshot.confidence,
                snapshot.blocker_count
            );
        }
    }
    Ok(())
}
