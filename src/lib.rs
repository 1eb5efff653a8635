// Phase Pipeline Library - guarded, auditable transitions between phase workers
// This exposes the core components for embedding and integration tests

pub mod completion;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod handoff;
pub mod registry;
pub mod telemetry;
pub mod transitions;
pub mod workers;
pub mod workflow;

// Re-export key types for easy access
pub use completion::{AdvanceDecision, AdvancePolicy, ConfidenceEstimator, MilestoneDetector, ReadinessAnalyzer, ThresholdPolicy};
pub use config::{config, init_config, ConflictPolicy, PipelineConfig, StorageBackend};
pub use coordinator::{CoordinatorError, PipelineCoordinator, SignalOutcome};
pub use events::{spawn_audit_logger, EventBus, EventSubscription, PipelineEvent};
pub use handoff::{build_handoff, HandoffBuilder, HandoffBundle, PhaseArtifacts};
pub use registry::{open_store, JsonFileStore, MemoryPhaseStore, PhaseStateRegistry, PhaseStore, StoreError};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry};
pub use transitions::{
    HookChain, TransitionError, TransitionExecutor, TransitionHook, TransitionRequest, TransitionResult,
    TransitionValidator,
};
pub use workers::{PhaseSignal, PhaseWorker, RemediationCollaborator, WorkerRegistry, WorkerSignal};
pub use workflow::{
    Phase, PhaseProgress, ProgressSnapshot, TransitionOutcome, TransitionRecord, TriggeringActor, WorkflowId,
    WorkflowInstance,
};
