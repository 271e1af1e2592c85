use crate::types::GroupTask;
use async_trait::async_trait;
use smarts_core::{ExecutionContext, SmartsResult};

/// A named integration that can execute group tasks.
///
/// The coordinator never knows how a backend reaches its target; HTTP,
/// in-process drivers and test doubles all sit behind this trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Execute `task` and return the backend's output.
    async fn execute(&self, task: &GroupTask, ctx: &ExecutionContext)
        -> SmartsResult<serde_json::Value>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> SmartsResult<()> {
        Ok(())
    }
}
