use crate::decomposer::{KeywordDecomposer, TaskDecomposer};
use crate::evolution::{EvolutionConfig, EvolutionEngine, GenerationReport};
use crate::hot_swap::{ComponentRelease, HotSwapManager};
use crate::reconfigurator::DynamicReconfigurator;
use crate::registry::AgentRegistry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smarts_core::{
    Agent, ExecutionContext, PerformanceReport, SmartsError, SmartsResult, Subtask, TaskResult,
};
use smarts_mcp::{Coordinator, GroupResult, GroupTask};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound for a single agent call.
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    /// Classify each task and apply the matching configuration before
    /// decomposing it.
    #[serde(default = "default_auto_reconfigure")]
    pub auto_reconfigure: bool,
}

fn default_execution_timeout_ms() -> u64 {
    30_000
}
fn default_auto_reconfigure() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            execution_timeout_ms: default_execution_timeout_ms(),
            auto_reconfigure: default_auto_reconfigure(),
        }
    }
}

/// Entry point for task processing.
///
/// Decomposes a description into subtasks and runs them one after another
/// on the best agent of each kind. A failed subtask is retried exactly once:
/// on the runner-up of its kind, or on the primary fallback when there is no
/// runner-up. Every subtask yields exactly one result. Results feed the
/// evolution engine in the background.
pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    decomposer: Arc<dyn TaskDecomposer>,
    evolution: Arc<EvolutionEngine>,
    reconfigurator: Option<Arc<DynamicReconfigurator>>,
    hot_swap: Arc<HotSwapManager>,
    coordinator: Option<Coordinator>,
    config: OrchestratorConfig,
    background: Mutex<JoinSet<Option<GenerationReport>>>,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator over `registry` with the keyword decomposer, a
    /// threshold-driven evolution engine, a default reconfigurator and an
    /// in-process hot-swap manager.
    pub fn new(registry: Arc<AgentRegistry>, config: OrchestratorConfig) -> Self {
        let evolution = Arc::new(EvolutionEngine::new(
            registry.clone(),
            EvolutionConfig::default(),
        ));
        Self {
            registry,
            decomposer: Arc::new(KeywordDecomposer::new()),
            evolution,
            reconfigurator: Some(Arc::new(DynamicReconfigurator::new())),
            hot_swap: Arc::new(HotSwapManager::default()),
            coordinator: None,
            config,
            background: Mutex::new(JoinSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the default keyword decomposer.
    pub fn with_decomposer(mut self, decomposer: Arc<dyn TaskDecomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    /// Replace the evolution engine.
    pub fn with_evolution(mut self, evolution: Arc<EvolutionEngine>) -> Self {
        self.evolution = evolution;
        self
    }

    /// Replace the reconfigurator; `None` disables reconfiguration.
    pub fn with_reconfigurator(
        mut self,
        reconfigurator: Option<Arc<DynamicReconfigurator>>,
    ) -> Self {
        self.reconfigurator = reconfigurator;
        self
    }

    /// Replace the hot-swap manager.
    pub fn with_hot_swap(mut self, hot_swap: Arc<HotSwapManager>) -> Self {
        self.hot_swap = hot_swap;
        self
    }

    /// Attach a coordinator for group dispatch.
    pub fn with_coordinator(mut self, coordinator: Coordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    /// Registry agents are selected from.
    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    /// Attached evolution engine.
    pub fn evolution(&self) -> &Arc<EvolutionEngine> {
        &self.evolution
    }

    /// Attached reconfigurator, if any.
    pub fn reconfigurator(&self) -> Option<&Arc<DynamicReconfigurator>> {
        self.reconfigurator.as_ref()
    }

    /// Attached hot-swap manager.
    pub fn hot_swap(&self) -> &Arc<HotSwapManager> {
        &self.hot_swap
    }

    /// Active settings.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Root token of every task context this orchestrator creates.
    /// Cancelling it fails all in-flight agent calls.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process `description` under `task_id`.
    ///
    /// The returned list has one result per subtask, in subtask order.
    pub async fn process_task(&self, description: &str, task_id: &str) -> Vec<TaskResult> {
        let ctx = ExecutionContext::with_token(task_id, self.cancel.child_token());
        self.process_task_with_context(description, &ctx).await
    }

    /// Like [`process_task`](Self::process_task) with a caller-owned context.
    pub async fn process_task_with_context(
        &self,
        description: &str,
        ctx: &ExecutionContext,
    ) -> Vec<TaskResult> {
        let start = Instant::now();
        info!(task_id = %ctx.task_id, task = %description, "Processing task");

        self.maybe_reconfigure(description);

        let subtasks = self.decomposer.decompose(description);
        info!(
            task_id = %ctx.task_id,
            subtasks = subtasks.len(),
            "Task decomposed"
        );

        let mut results = Vec::with_capacity(subtasks.len());
        for subtask in &subtasks {
            results.push(self.dispatch(subtask, ctx).await);
        }

        self.schedule_evolution(&ctx.task_id, &results);

        info!(
            task_id = %ctx.task_id,
            succeeded = results.iter().filter(|r| r.success).count(),
            total = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Task processed"
        );
        results
    }

    fn maybe_reconfigure(&self, description: &str) {
        if !self.config.auto_reconfigure {
            return;
        }
        if let Some(reconfigurator) = &self.reconfigurator {
            let proposed = reconfigurator.analyze_task(description);
            if !reconfigurator.reconfigure(proposed) {
                warn!("Proposed configuration rejected, continuing with current one");
            }
        }
    }

    /// Run one subtask through the selection and recovery chain.
    async fn dispatch(&self, subtask: &Subtask, ctx: &ExecutionContext) -> TaskResult {
        let primary = self.registry.select_for_type(subtask.kind);
        let primary_id = primary.descriptor().id.clone();

        let failed = match self.attempt(&primary, subtask, ctx).await {
            Ok(result) => return result,
            Err(failed) => failed,
        };
        error!(
            task_id = %ctx.task_id,
            subtask_id = %subtask.id,
            agent_id = %primary_id,
            error = failed.error.as_deref().unwrap_or("unknown"),
            "Subtask failed, attempting recovery"
        );

        let alternative = self
            .registry
            .select_alternative(subtask.kind)
            .filter(|a| a.descriptor().id != primary_id);
        if let Some(alternative) = alternative {
            warn!(
                subtask_id = %subtask.id,
                agent_id = %alternative.descriptor().id,
                "Retrying on alternative agent"
            );
            // One hop only: the alternative's outcome is final.
            return match self.attempt(&alternative, subtask, ctx).await {
                Ok(result) => recovered(result),
                Err(failed) => {
                    error!(
                        task_id = %ctx.task_id,
                        subtask_id = %subtask.id,
                        agent_id = %alternative.descriptor().id,
                        error = failed.error.as_deref().unwrap_or("unknown"),
                        "Alternative agent failed"
                    );
                    recovered(failed)
                }
            };
        }

        let fallback = self.registry.primary_fallback();
        warn!(
            subtask_id = %subtask.id,
            agent_id = %fallback.descriptor().id,
            "No alternative agent, retrying on primary fallback"
        );
        match self.attempt(&fallback, subtask, ctx).await {
            Ok(result) => recovered(result),
            Err(failed) => {
                error!(
                    task_id = %ctx.task_id,
                    subtask_id = %subtask.id,
                    "Recovery chain exhausted"
                );
                recovered(failed)
            }
        }
    }

    /// One bounded, cancellable call. Metrics are recorded either way; the
    /// error side carries a stamped failure result.
    async fn attempt(
        &self,
        agent: &Arc<dyn Agent>,
        subtask: &Subtask,
        ctx: &ExecutionContext,
    ) -> Result<TaskResult, TaskResult> {
        let agent_id = agent.descriptor().id.clone();
        let timeout = Duration::from_millis(self.config.execution_timeout_ms);
        let start = Instant::now();

        let outcome = if ctx.is_cancelled() {
            Err(SmartsError::Cancelled(format!("{agent_id} on {}", subtask.id)))
        } else {
            tokio::select! {
                _ = ctx.cancelled() => {
                    Err(SmartsError::Cancelled(format!("{agent_id} on {}", subtask.id)))
                }
                res = tokio::time::timeout(timeout, agent.execute(subtask, ctx)) => match res {
                    Ok(inner) => inner,
                    Err(_) => Err(SmartsError::Timeout(format!(
                        "{agent_id} after {}ms",
                        self.config.execution_timeout_ms
                    ))),
                },
            }
        };
        let measured = start.elapsed().as_millis() as u64;

        let mut result = match outcome {
            Ok(result) => result,
            Err(e) => TaskResult::failure(e.to_string()),
        };
        if result.execution_time_ms.is_none() {
            result.execution_time_ms = Some(measured);
        }
        result.agent_id = Some(agent_id.clone());
        result.subtask_id = Some(subtask.id.clone());

        self.registry
            .update_metrics(&agent_id, &PerformanceReport::from_result(&result));

        if result.success {
            Ok(result)
        } else {
            Err(result)
        }
    }

    fn schedule_evolution(&self, task_id: &str, results: &[TaskResult]) {
        let engine = self.evolution.clone();
        let task_id = task_id.to_string();
        let results = results.to_vec();
        let mut background = self.background.lock();
        while let Some(done) = background.try_join_next() {
            log_evolution_outcome(done);
        }
        background.spawn(async move { engine.evaluate_and_evolve(&task_id, &results) });
    }

    /// Deploy a new version of a component. See [`HotSwapManager::swap`].
    pub async fn hot_swap_component(&self, component_id: &str, release: ComponentRelease) -> bool {
        self.hot_swap.swap(component_id, release).await
    }

    /// Run `description` across a coordination group instead of the agent
    /// pool.
    pub async fn process_task_with_group(
        &self,
        description: &str,
        task_id: &str,
        group_id: &str,
    ) -> SmartsResult<GroupResult> {
        self.process_group_task(&GroupTask::new(description), task_id, group_id).await
    }

    /// Like [`Self::process_task_with_group`], for a task that carries a payload.
    pub async fn process_group_task(
        &self,
        task: &GroupTask,
        task_id: &str,
        group_id: &str,
    ) -> SmartsResult<GroupResult> {
        let coordinator = self
            .coordinator
            .as_ref()
            .ok_or_else(|| SmartsError::Config("no coordinator attached".into()))?;
        let ctx = ExecutionContext::with_token(task_id, self.cancel.child_token());
        coordinator.execute_group_by_id(task, &ctx, group_id).await
    }

    /// Force one evolution generation now.
    pub fn trigger_evolution(&self) -> GenerationReport {
        self.evolution.run_generation()
    }

    /// Wait for every pending evaluation and return the generations they ran.
    pub async fn shutdown(&self) -> Vec<GenerationReport> {
        let mut pending = std::mem::take(&mut *self.background.lock());
        let mut reports = Vec::new();
        while let Some(done) = pending.join_next().await {
            if let Some(report) = log_evolution_outcome(done) {
                reports.push(report);
            }
        }
        reports
    }

    /// Abort pending evaluations without waiting for them.
    pub fn cancel_background(&self) {
        self.background.lock().abort_all();
    }
}

fn recovered(mut result: TaskResult) -> TaskResult {
    result.recovered = true;
    result
}

fn log_evolution_outcome(
    done: Result<Option<GenerationReport>, tokio::task::JoinError>,
) -> Option<GenerationReport> {
    match done {
        Ok(report) => report,
        Err(e) if e.is_cancelled() => None,
        Err(e) => {
            error!(error = %e, "Evolution task failed");
            None
        }
    }
}
