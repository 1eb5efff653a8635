//! Transition validation and execution.

pub mod errors;
pub mod executor;
pub mod hooks;
pub mod locks;
pub mod validator;

pub use errors::TransitionError;
pub use executor::{TransitionExecutor, TransitionRequest, TransitionResult};
pub use hooks::{HookChain, HookError, HumanReviewGate, TransitionContext, TransitionHook, TransitionLogHook};
pub use locks::{LockError, WorkflowLockGuard, WorkflowLocks};
pub use validator::{allowed_targets, can_transition, PrerequisiteCheck, TargetOption, TransitionValidator};
