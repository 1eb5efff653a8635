use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{EventBus, PipelineEvent, SubscriptionError};

/// Subscribe to the firehose and log one structured line per event.
///
/// The task ends when the bus is dropped.
pub fn spawn_audit_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe_all();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(SubscriptionError::Lagged(missed)) => {
                    warn!(missed, "Audit logger fell behind; consult the transition log for missed events");
                }
                Err(SubscriptionError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Transition {
            workflow_id,
            record_id,
            from,
            to,
            actor,
            forced,
            ..
        } => info!(
            event = "transition",
            workflow_id = %workflow_id,
            record_id = %record_id,
            from = %from,
            to = %to,
            actor = %actor,
            forced = *forced,
            "audit"
        ),
        PipelineEvent::Progress { snapshot } => info!(
            event = "progress",
            workflow_id = %snapshot.workflow_id,
            phase = %snapshot.phase,
            completion = snapshot.completion_score,
            confidence = snapshot.confidence,
            blockers = snapshot.blocker_count,
            "audit"
        ),
        PipelineEvent::TransitionAvailable {
            workflow_id,
            from,
            to,
            metrics,
            missing,
            ..
        } => info!(
            event = "transition_available",
            workflow_id = %workflow_id,
            from = %from,
            to = %to,
            confidence = metrics.confidence,
            unmet = missing.len(),
            "audit"
        ),
    }
}
