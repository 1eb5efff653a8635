use anyhow::Result;
use phase_pipeline::{handoff::FieldSource, WorkflowId};

use super::{phase_icon, with_coordinator, Command};

pub struct HandoffsCommand {
    pub workflow_id: String,
}

impl HandoffsCommand {
    pub fn new(workflow_id: String) -> Self {
        Self { workflow_id }
    }
}

fn source_tag(source: FieldSource) -> &'static str {
    match source {
        FieldSource::Structured => "structured",
        FieldSource::Extracted => "extracted",
        FieldSource::Absent => "absent",
    }
}

impl Command for HandoffsCommand {
    async fn execute(&self) -> Result<()> {
        let id = WorkflowId::new(self.workflow_id.clone());
        with_coordinator(|coordinator| async move {
            let bundles = coordinator.handoffs(&id).await?;
            if bundles.is_empty() {
                println!("📦 No handoff bundles for {}", id);
                return Ok(());
            }

            for bundle in &bundles {
                let provenance = bundle.provenance();
                println!(
                    "📦 {} {} → {} {} (schema v{}, {})",
                    phase_icon(bundle.source_phase()),
                    bundle.source_phase(),
                    phase_icon(bundle.target_phase()),
                    bundle.target_phase(),
                    bundle.schema_version(),
                    bundle.created_at().format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!(
                    "   🎯 Problem: {} [{}]",
                    bundle.problem_statement().unwrap_or("-"),
                    source_tag(provenance.problem_statement)
                );
                println!(
                    "   📋 Requirements: {} [{}]",
                    bundle.requirements().len(),
                    source_tag(provenance.requirements)
                );
                println!(
                    "   🗺️  Plan steps: {} [{}]",
                    bundle.execution_plan().len(),
                    source_tag(provenance.execution_plan)
                );
                println!(
                    "   🏷️  Entities: {} [{}]",
                    bundle.entities().join(", "),
                    source_tag(provenance.entities)
                );
                println!();
            }
            Ok(())
        })
        .await
    }
}
