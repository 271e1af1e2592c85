use crate::task::{AgentDescriptor, Subtask, TaskResult};
use crate::SmartsResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Per-call context handed to agents and backends.
///
/// Carries the id of the parent task and a cancellation token. Implementations
/// doing real work should watch [`ExecutionContext::cancelled`] and stop early;
/// callers also enforce a timeout around every call.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Id of the task this call belongs to.
    pub task_id: String,
    cancel: CancellationToken,
}

impl ExecutionContext {
    /// Create a context with a fresh, uncancelled token.
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build a context bound to an existing token.
    pub fn with_token(task_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            task_id: task_id.into(),
            cancel,
        }
    }

    /// A context for a sub-call: cancelling the parent cancels the child, not
    /// the other way round.
    pub fn child(&self) -> Self {
        Self {
            task_id: self.task_id.clone(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Trait that every worker must implement, whether an in-process driver
/// wrapper or a proxy to an external service.
///
/// An `Err` and a `TaskResult` with `success == false` are both treated as
/// failures by the orchestrator.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Static identity of the agent.
    fn descriptor(&self) -> &AgentDescriptor;

    /// Carry out `subtask`.
    async fn execute(&self, subtask: &Subtask, ctx: &ExecutionContext) -> SmartsResult<TaskResult>;
}
