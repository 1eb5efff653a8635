use anyhow::Result;
use phase_pipeline::{
    Phase, TransitionError, TransitionRequest, TransitionResult, TriggeringActor, WorkflowId,
};

use super::{phase_icon, with_coordinator, Command};

pub struct TransitionCommand {
    pub workflow_id: String,
    pub target: Phase,
    pub reason: String,
    pub force: bool,
}

impl TransitionCommand {
    pub fn new(workflow_id: String, target: Phase, reason: String) -> Self {
        Self {
            workflow_id,
            target,
            reason,
            force: false,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

impl Command for TransitionCommand {
    async fn execute(&self) -> Result<()> {
        let request = TransitionRequest::new(WorkflowId::new(self.workflow_id.clone()), self.target, self.reason.clone())
            .forced(self.force)
            .by(TriggeringActor::Human);

        with_coordinator(|coordinator| async move {
            report(coordinator.request_transition(request).await)
        })
        .await
    }
}

/// Pause or resume
pub struct PauseCommand {
    pub workflow_id: String,
    pub reason: String,
    pub resume: bool,
}

impl PauseCommand {
    pub fn pause(workflow_id: String, reason: String) -> Self {
        Self {
            workflow_id,
            reason,
            resume: false,
        }
    }

    pub fn resume(workflow_id: String, reason: String) -> Self {
        Self {
            workflow_id,
            reason,
            resume: true,
        }
    }
}

impl Command for PauseCommand {
    async fn execute(&self) -> Result<()> {
        let id = WorkflowId::new(self.workflow_id.clone());
        let reason = self.reason.clone();
        let resume = self.resume;

        with_coordinator(|coordinator| async move {
            let result = if resume {
                coordinator.resume(&id, reason, TriggeringActor::Human).await
            } else {
                coordinator.pause(&id, reason, TriggeringActor::Human).await
            };
            report(result)
        })
        .await
    }
}

fn report(result: Result<TransitionResult, TransitionError>) -> Result<()> {
    match result {
        Ok(TransitionResult::Committed(record)) => {
            println!(
                "✅ {} {} → {} {}",
                phase_icon(record.from_phase),
                record.from_phase,
                phase_icon(record.to_phase),
                record.to_phase
            );
            if record.forced {
                println!("   ⚠️  Forced past validation; flagged in the audit log");
            }
            Ok(())
        }
        Ok(TransitionResult::NoOp { phase }) => {
            println!("ℹ️  Already in {}; nothing to do", phase);
            Ok(())
        }
        Err(e) => {
            println!("❌ Transition refused [{}]", e.reason_code());
            match &e {
                TransitionError::PrerequisiteNotMet { missing, .. } => {
                    for reason in missing {
                        println!("   • {}", reason);
                    }
                }
                other => println!("   {}", other),
            }
            if e.was_rolled_back() {
                println!("   ↩️  All changes were rolled back");
            }
            Err(e.into())
        }
    }
}
