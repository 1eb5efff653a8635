// Transition hooks - ordered extension points around the executor's mutation
//
// Pre-hooks run after validation and before anything is mutated; the first
// failure aborts the transition. Post-hooks run after the per-workflow lock is
// released and can only log.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::workflow::{Phase, TriggeringActor, WorkflowId, WorkflowInstance};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Rejected(String),

    #[error("hook failed: {0}")]
    Failed(String),
}

/// What a hook sees about the transition being executed
#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub workflow_id: WorkflowId,
    pub from: Phase,
    pub to: Phase,
    pub reason: String,
    pub actor: TriggeringActor,
    pub forced: bool,
    pub correlation_id: String,
    /// Instance as loaded before the transition
    pub instance: WorkflowInstance,
}

#[async_trait]
pub trait TransitionHook: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before mutation; an error aborts the transition
    async fn before(&self, _context: &TransitionContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs after a committed transition; errors are logged only
    async fn after(&self, _context: &TransitionContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// Hooks in registration order
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Arc<dyn TransitionHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hooks every executor carries unless configured otherwise
    pub fn with_builtin() -> Self {
        Self::new()
            .with_hook(Arc::new(HumanReviewGate))
            .with_hook(Arc::new(TransitionLogHook))
    }

    pub fn with_hook(mut self, hook: Arc<dyn TransitionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Stop at the first failing pre-hook, returning its name and error
    pub async fn run_before(&self, context: &TransitionContext) -> Result<(), (String, HookError)> {
        for hook in &self.hooks {
            hook.before(context)
                .await
                .map_err(|e| (hook.name().to_string(), e))?;
        }
        Ok(())
    }

    pub async fn run_after(&self, context: &TransitionContext) {
        for hook in &self.hooks {
            if let Err(e) = hook.after(context).await {
                warn!(
                    workflow_id = %context.workflow_id,
                    hook = hook.name(),
                    error = %e,
                    "Post-transition hook failed"
                );
            }
        }
    }
}

/// Keeps automatic transitions away from workflows that need a human decision
pub struct HumanReviewGate;

#[async_trait]
impl TransitionHook for HumanReviewGate {
    fn name(&self) -> &str {
        "human_review_gate"
    }

    async fn before(&self, context: &TransitionContext) -> Result<(), HookError> {
        if context.instance.human_review_required && context.actor == TriggeringActor::Auto {
            return Err(HookError::Rejected(format!(
                "workflow {} requires human review before leaving {}",
                context.workflow_id, context.from
            )));
        }
        Ok(())
    }
}

/// One structured log line per committed transition
pub struct TransitionLogHook;

#[async_trait]
impl TransitionHook for TransitionLogHook {
    fn name(&self) -> &str {
        "transition_log"
    }

    async fn after(&self, context: &TransitionContext) -> Result<(), HookError> {
        info!(
            workflow_id = %context.workflow_id,
            from = %context.from,
            to = %context.to,
            actor = %context.actor,
            forced = context.forced,
            correlation_id = %context.correlation_id,
            reason = %context.reason,
            "Phase transition committed"
        );
        Ok(())
    }
}
