//! Event bus: per-workflow publish/subscribe over tokio broadcast channels.
//!
//! Every event goes to the publishing workflow's channel and to a firehose that
//! sees all workflows. Delivery is in-process only. A subscriber that falls more
//! than the channel capacity behind is told how many events it missed; the
//! transition record log is the durable source of truth.

pub mod audit;

pub use audit::spawn_audit_logger;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::workflow::{Phase, ProgressSnapshot, TransitionRecord, TriggeringActor, WorkflowId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A transition committed
    Transition {
        workflow_id: WorkflowId,
        record_id: Uuid,
        from: Phase,
        to: Phase,
        actor: TriggeringActor,
        forced: bool,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    /// A phase worker reported progress
    Progress { snapshot: ProgressSnapshot },
    /// A transition could be requested; a human or system actor has to act on it
    TransitionAvailable {
        workflow_id: WorkflowId,
        from: Phase,
        to: Phase,
        metrics: ProgressSnapshot,
        /// Prerequisites still unmet for `to`
        missing: Vec<String>,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    pub fn transition(record: &TransitionRecord) -> Self {
        PipelineEvent::Transition {
            workflow_id: record.workflow_id.clone(),
            record_id: record.id,
            from: record.from_phase,
            to: record.to_phase,
            actor: record.triggering_actor,
            forced: record.forced,
            reason: record.reason.clone(),
            timestamp: record.timestamp,
        }
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        match self {
            PipelineEvent::Transition { workflow_id, .. } => workflow_id,
            PipelineEvent::Progress { snapshot } => &snapshot.workflow_id,
            PipelineEvent::TransitionAvailable { workflow_id, .. } => workflow_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Transition { .. } => "transition",
            PipelineEvent::Progress { .. } => "progress",
            PipelineEvent::TransitionAvailable { .. } => "transition_available",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The subscriber fell behind; the oldest events were dropped
    #[error("subscriber lagged behind and missed {0} events")]
    Lagged(u64),

    #[error("event bus closed")]
    Closed,
}

pub struct EventSubscription {
    receiver: broadcast::Receiver<PipelineEvent>,
}

impl EventSubscription {
    /// Next event. After `Lagged` the subscription keeps going from the oldest
    /// event still buffered.
    pub async fn recv(&mut self) -> Result<PipelineEvent, SubscriptionError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Lagged(missed) => SubscriptionError::Lagged(missed),
            broadcast::error::RecvError::Closed => SubscriptionError::Closed,
        })
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Result<Option<PipelineEvent>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Lagged(missed)) => Err(SubscriptionError::Lagged(missed)),
            Err(broadcast::error::TryRecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }

    /// Every event buffered right now, skipping over lag gaps
    pub fn drain(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(Some(event)) => events.push(event),
                Ok(None) | Err(SubscriptionError::Closed) => break,
                Err(SubscriptionError::Lagged(missed)) => {
                    warn!(missed, "Subscriber lagged while draining events");
                }
            }
        }
        events
    }
}

pub struct EventBus {
    capacity: usize,
    channels: Mutex<HashMap<WorkflowId, broadcast::Sender<PipelineEvent>>>,
    firehose: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (firehose, _) = broadcast::channel(capacity);
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
            firehose,
        }
    }

    pub fn publish(&self, event: PipelineEvent) {
        {
            let mut channels = self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let workflow_id = event.workflow_id();
            let abandoned = match channels.get(workflow_id) {
                Some(sender) => sender.send(event.clone()).is_err(),
                None => false,
            };
            if abandoned {
                debug!(workflow_id = %workflow_id, "Dropping channel without subscribers");
                channels.remove(workflow_id);
            }
        }

        // Ignore error if no receivers
        let _ = self.firehose.send(event);
    }

    pub fn subscribe(&self, workflow_id: &WorkflowId) -> EventSubscription {
        let mut channels = self.channels.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let receiver = channels
            .entry(workflow_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();
        EventSubscription { receiver }
    }

    /// Events of every workflow
    pub fn subscribe_all(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.firehose.subscribe(),
        }
    }

    /// Workflows that currently have a live channel
    pub fn channel_count(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|sender| sender.receiver_count() > 0)
            .count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
