use async_trait::async_trait;
use smarts_core::{
    Agent, AgentDescriptor, AgentKind, AgentMetrics, ExecutionContext, SmartsResult, Subtask,
    TaskResult,
};
use tracing::warn;

/// Id of the synthetic fallback agent.
pub const FALLBACK_AGENT_ID: &str = "primary-agent-fallback";

/// Dead-letter sink used when the registry is empty.
///
/// Always succeeds with an empty payload so that every subtask resolves to a
/// result.
#[derive(Debug, Clone)]
pub struct FallbackAgent {
    descriptor: AgentDescriptor,
}

impl FallbackAgent {
    /// Create the fallback sink.
    pub fn new() -> Self {
        Self {
            descriptor: AgentDescriptor::new(FALLBACK_AGENT_ID, AgentKind::Planning, "1.0.0")
                .with_capabilities(["planning", "coordination"]),
        }
    }

    /// Perfect nominal metrics reported for the fallback.
    pub fn nominal_metrics() -> AgentMetrics {
        AgentMetrics::new(1.0, 0.0, 0)
    }
}

impl Default for FallbackAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for FallbackAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, subtask: &Subtask, ctx: &ExecutionContext) -> SmartsResult<TaskResult> {
        warn!(
            task_id = %ctx.task_id,
            subtask_id = %subtask.id,
            "No registered agent available, subtask absorbed by fallback"
        );
        Ok(TaskResult::success(serde_json::Value::Null).with_execution_time(0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fallback_always_succeeds() {
        let agent = FallbackAgent::new();
        let ctx = ExecutionContext::new("t");
        ctx.cancel();
        let subtask = Subtask::new("action-1", AgentKind::Action, "Execute click action", 2);
        let result = agent.execute(&subtask, &ctx).await.unwrap();
        assert!(result.success);
        assert!(result.payload.is_null());
        assert_eq!(agent.descriptor().id, FALLBACK_AGENT_ID);
    }

    #[test]
    fn test_nominal_metrics_are_perfect() {
        let m = FallbackAgent::nominal_metrics();
        assert_eq!(m.success_rate, 1.0);
        assert_eq!(m.avg_execution_time_ms, 0.0);
    }
}
