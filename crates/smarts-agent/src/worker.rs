use crate::driver::Driver;
use async_trait::async_trait;
use smarts_core::{
    Agent, AgentDescriptor, AgentKind, ExecutionContext, SmartsError, SmartsResult, Subtask,
    TaskResult,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A worker that carries out subtasks of its kind through a [`Driver`].
pub struct DriverAgent {
    descriptor: AgentDescriptor,
    driver: Arc<dyn Driver>,
}

impl DriverAgent {
    /// Wrap `driver` under the identity in `descriptor`.
    pub fn new(descriptor: AgentDescriptor, driver: Arc<dyn Driver>) -> Self {
        Self { descriptor, driver }
    }

    fn summary(kind: AgentKind) -> &'static str {
        match kind {
            AgentKind::Vision => "Visual processing completed",
            AgentKind::Action => "Action executed successfully",
            AgentKind::Planning => "Plan created",
            AgentKind::Learning => "Performance analysis completed",
        }
    }
}

#[async_trait]
impl Agent for DriverAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn execute(&self, subtask: &Subtask, ctx: &ExecutionContext) -> SmartsResult<TaskResult> {
        if ctx.is_cancelled() {
            return Err(SmartsError::Cancelled(format!(
                "{} before start of {}",
                self.descriptor.id, subtask.id
            )));
        }

        info!(
            agent_id = %self.descriptor.id,
            task_id = %ctx.task_id,
            subtask_id = %subtask.id,
            driver = self.driver.name(),
            "Executing subtask"
        );

        let start = Instant::now();
        let observation = self
            .driver
            .perform(self.descriptor.kind, subtask, ctx)
            .await?;
        let elapsed = start.elapsed().as_millis() as u64;

        let accuracy = observation.get("accuracy").and_then(serde_json::Value::as_f64);

        let payload = serde_json::json!({
            "result": Self::summary(self.descriptor.kind),
            "kind": self.descriptor.kind,
            "subtask": subtask.description,
            "observation": observation,
        });

        debug!(agent_id = %self.descriptor.id, elapsed_ms = elapsed, "Subtask finished");

        let mut result = TaskResult::success(payload).with_execution_time(elapsed);
        if let Some(acc) = accuracy {
            result = result.with_accuracy(acc);
        }
        Ok(result)
    }
}
