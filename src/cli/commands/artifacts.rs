use anyhow::{Context, Result};
use phase_pipeline::{PhaseArtifacts, Phase, WorkflowId};
use std::path::PathBuf;

use super::{phase_icon, with_coordinator, Command};

/// Import a phase's accumulated artifacts from a JSON document
pub struct ArtifactsCommand {
    pub workflow_id: String,
    pub phase: Phase,
    pub file: PathBuf,
}

impl ArtifactsCommand {
    pub fn new(workflow_id: String, phase: Phase, file: PathBuf) -> Self {
        Self {
            workflow_id,
            phase,
            file,
        }
    }
}

impl Command for ArtifactsCommand {
    async fn execute(&self) -> Result<()> {
        let content = tokio::fs::read_to_string(&self.file)
            .await
            .with_context(|| format!("Failed to read {}", self.file.display()))?;
        let artifacts: PhaseArtifacts = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a valid artifacts document", self.file.display()))?;

        let id = WorkflowId::new(self.workflow_id.clone());
        let phase = self.phase;
        with_coordinator(|coordinator| async move {
            // Fail early on unknown workflows rather than storing orphaned artifacts
            coordinator.instance(&id).await?;
            coordinator.record_artifacts(&id, phase, &artifacts).await?;

            println!("✅ Stored {} artifacts for {}", phase, id);
            println!(
                "   {} {} structured, {} turns, {} questions ({} open), {} work units",
                phase_icon(phase),
                artifacts.structured.len(),
                artifacts.conversation.len(),
                artifacts.questions.len(),
                artifacts.open_questions(),
                artifacts.generated_tasks()
            );
            println!("💡 Re-score with: phase-pipeline progress {} --analyze {}", id, phase);
            Ok(())
        })
        .await
    }
}
