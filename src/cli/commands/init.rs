use anyhow::Result;
use phase_pipeline::{WorkflowId, WorkflowInstance};

use super::{phase_icon, with_coordinator, Command};

pub struct InitCommand {
    pub id: Option<String>,
    pub auto_advance: bool,
    pub human_review: bool,
}

impl InitCommand {
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            auto_advance: false,
            human_review: false,
        }
    }

    pub fn with_auto_advance(mut self, auto_advance: bool) -> Self {
        self.auto_advance = auto_advance;
        self
    }

    pub fn with_human_review(mut self, human_review: bool) -> Self {
        self.human_review = human_review;
        self
    }
}

impl Command for InitCommand {
    async fn execute(&self) -> Result<()> {
        let id = match &self.id {
            Some(id) => WorkflowId::new(id.clone()),
            None => WorkflowId::generate(),
        };
        let instance = WorkflowInstance::new(id)
            .with_auto_advance(self.auto_advance)
            .with_human_review(self.human_review);

        with_coordinator(|coordinator| async move {
            let instance = coordinator.create_workflow(instance).await?;
            println!("✅ Registered workflow {}", instance.id);
            println!(
                "   {} Phase: {}",
                phase_icon(instance.current_phase),
                instance.current_phase
            );
            println!(
                "   ⚙️  Auto-advance: {} | Human review: {}",
                if instance.auto_advance { "on" } else { "off" },
                if instance.human_review_required { "required" } else { "optional" }
            );
            println!();
            println!("💡 Next: phase-pipeline targets {}", instance.id);
            Ok(())
        })
        .await
    }
}
