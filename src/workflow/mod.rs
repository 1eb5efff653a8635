//! Workflow data model: phases, instances, progress snapshots and the
//! transition audit record.

pub mod instance;
pub mod phase;
pub mod progress;
pub mod record;

pub use instance::{WorkflowId, WorkflowInstance};
pub use phase::{Phase, UnknownPhase};
pub use progress::{PhaseProgress, ProgressSnapshot};
pub use record::{TransitionOutcome, TransitionRecord, TriggeringActor};
