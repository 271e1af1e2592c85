use async_trait::async_trait;
use smarts_core::{AgentKind, ExecutionContext, SmartsResult, Subtask};

/// Narrow interface to the computer-control primitives (screen capture,
/// mouse, keyboard) that workers delegate to.
///
/// Implementations live outside this workspace; the returned JSON is passed
/// through as the worker's observation.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Perform the primitive work for one subtask of the given kind.
    async fn perform(
        &self,
        kind: AgentKind,
        subtask: &Subtask,
        ctx: &ExecutionContext,
    ) -> SmartsResult<serde_json::Value>;

    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "driver"
    }
}

/// A driver that touches nothing and acknowledges every request.
///
/// Output is a pure function of its inputs so runs are replayable.
#[derive(Debug, Default, Clone)]
pub struct DryRunDriver;

#[async_trait]
impl Driver for DryRunDriver {
    async fn perform(
        &self,
        kind: AgentKind,
        subtask: &Subtask,
        ctx: &ExecutionContext,
    ) -> SmartsResult<serde_json::Value> {
        let observation = match kind {
            AgentKind::Vision => serde_json::json!({
                "elements_identified": [],
                "text_extracted": "",
            }),
            AgentKind::Action => serde_json::json!({ "performed": subtask.description }),
            AgentKind::Planning => serde_json::json!({
                "steps": [format!("analyze: {}", subtask.description), "execute", "verify"],
            }),
            AgentKind::Learning => serde_json::json!({ "recommendations": [] }),
        };

        Ok(serde_json::json!({
            "dry_run": true,
            "task_id": ctx.task_id,
            "subtask_id": subtask.id,
            "observation": observation,
        }))
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
