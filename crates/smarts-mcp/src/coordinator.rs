use crate::manager::{BackendHandle, BackendManager};
use crate::types::{
    CoordinationGroup, CoordinationStrategy, GroupOutcome, GroupResult, GroupTask, MemberResult,
};
use serde::{Deserialize, Serialize};
use smarts_core::{ExecutionContext, SmartsError, SmartsResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Upper bound for a single backend call.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

/// Runs group tasks across backends.
///
/// Every member produces exactly one [`MemberResult`]; a failing member
/// never stops or corrupts the others.
#[derive(Clone)]
pub struct Coordinator {
    manager: Arc<BackendManager>,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Create a coordinator with default settings.
    pub fn new(manager: Arc<BackendManager>) -> Self {
        Self {
            manager,
            config: CoordinatorConfig::default(),
        }
    }

    /// Override the default settings.
    pub fn with_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Backend manager used to resolve members.
    pub fn manager(&self) -> &Arc<BackendManager> {
        &self.manager
    }

    /// Resolve `group_id` through the manager and execute it.
    pub async fn execute_group_by_id(
        &self,
        task: &GroupTask,
        ctx: &ExecutionContext,
        group_id: &str,
    ) -> SmartsResult<GroupResult> {
        let group = self
            .manager
            .get_group(group_id)
            .await
            .ok_or_else(|| SmartsError::UnknownEntity(format!("group {group_id}")))?;
        self.execute_group(task, ctx, &group).await
    }

    /// Execute `task` across the members of `group` under its strategy.
    ///
    /// Fails only when the group has no members; member failures are
    /// reported inside the result.
    pub async fn execute_group(
        &self,
        task: &GroupTask,
        ctx: &ExecutionContext,
        group: &CoordinationGroup,
    ) -> SmartsResult<GroupResult> {
        if group.member_ids.is_empty() {
            return Err(SmartsError::Validation(format!(
                "group '{}' has no members",
                group.id
            )));
        }

        info!(
            group = %group.id,
            task_id = %ctx.task_id,
            strategy = %group.strategy,
            members = group.member_ids.len(),
            "Executing coordination group"
        );

        let outcome = match group.strategy {
            CoordinationStrategy::Sequential => {
                GroupOutcome::Flat(self.run_sequential(task, ctx, group).await)
            }
            CoordinationStrategy::Parallel => {
                GroupOutcome::Flat(self.run_parallel(task, ctx, group).await)
            }
            CoordinationStrategy::Hierarchical => self.run_hierarchical(task, ctx, group).await,
        };

        let result = GroupResult {
            group_id: group.id.clone(),
            task_id: ctx.task_id.clone(),
            strategy: group.strategy,
            outcome,
        };
        info!(
            group = %group.id,
            task_id = %ctx.task_id,
            succeeded = result.success_count(),
            "Coordination group finished"
        );
        Ok(result)
    }

    async fn run_sequential(
        &self,
        task: &GroupTask,
        ctx: &ExecutionContext,
        group: &CoordinationGroup,
    ) -> Vec<MemberResult> {
        let mut results = Vec::with_capacity(group.member_ids.len());
        for member in &group.member_ids {
            results.push(
                self.run_member(member, task, ctx, group.fallback_id.as_deref())
                    .await,
            );
        }
        results
    }

    async fn run_parallel(
        &self,
        task: &GroupTask,
        ctx: &ExecutionContext,
        group: &CoordinationGroup,
    ) -> Vec<MemberResult> {
        let branches: Vec<_> = group
            .member_ids
            .iter()
            .map(|member| {
                let this = self.clone();
                let branch_member = member.clone();
                let task = task.clone();
                let branch_ctx = ctx.child();
                let fallback = group.fallback_id.clone();
                let handle = tokio::spawn(async move {
                    this.run_member(&branch_member, &task, &branch_ctx, fallback.as_deref())
                        .await
                });
                (member.clone(), handle)
            })
            .collect();

        let mut results = Vec::with_capacity(branches.len());
        for (member, handle) in branches {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(backend = %member, error = %e, "Parallel branch aborted");
                    results.push(MemberResult::failure(member, format!("branch aborted: {e}")));
                }
            }
        }
        results
    }

    async fn run_hierarchical(
        &self,
        task: &GroupTask,
        ctx: &ExecutionContext,
        group: &CoordinationGroup,
    ) -> GroupOutcome {
        let fallback = group.fallback_id.as_deref();
        let Some((primary_id, secondary_ids)) = group.member_ids.split_first() else {
            return GroupOutcome::Flat(Vec::new());
        };

        let primary = self.run_member(primary_id, task, ctx, fallback).await;

        let mut delegated = task.clone();
        delegated.parent = Some(primary.as_parent());

        let mut secondary = Vec::with_capacity(secondary_ids.len());
        for member in secondary_ids {
            secondary.push(self.run_member(member, &delegated, ctx, fallback).await);
        }
        GroupOutcome::Hierarchical { primary, secondary }
    }

    /// Run one member, retrying once on the group fallback when it fails.
    async fn run_member(
        &self,
        member_id: &str,
        task: &GroupTask,
        ctx: &ExecutionContext,
        fallback_id: Option<&str>,
    ) -> MemberResult {
        let handle = self.manager.get_backend(member_id).await;
        let name = handle.as_ref().map(|h| h.config.name.clone());

        let first = match &handle {
            Some(h) => self.call(h, task, ctx).await,
            None => Err(SmartsError::UnknownEntity(format!("backend {member_id}"))),
        };

        let result = match first {
            Ok(output) => MemberResult::success(member_id, output),
            Err(e) => {
                warn!(
                    backend = %member_id,
                    task_id = %ctx.task_id,
                    error = %e,
                    "Backend call failed"
                );
                match fallback_id.filter(|fb| *fb != member_id) {
                    Some(fb) => self.retry_on_fallback(member_id, fb, task, ctx, e).await,
                    None => MemberResult::failure(member_id, e.to_string()),
                }
            }
        };

        match name {
            Some(name) => result.with_name(name),
            None => result,
        }
    }

    async fn retry_on_fallback(
        &self,
        member_id: &str,
        fallback_id: &str,
        task: &GroupTask,
        ctx: &ExecutionContext,
        original: SmartsError,
    ) -> MemberResult {
        let attempt = match self.manager.get_backend(fallback_id).await {
            Some(h) => self.call(&h, task, ctx).await,
            None => Err(SmartsError::UnknownEntity(format!("backend {fallback_id}"))),
        };

        let mut result = match attempt {
            Ok(output) => {
                info!(
                    backend = %member_id,
                    fallback = %fallback_id,
                    "Branch recovered on fallback backend"
                );
                MemberResult::success(member_id, output)
            }
            Err(e) => {
                error!(
                    backend = %member_id,
                    fallback = %fallback_id,
                    error = %e,
                    "Fallback backend also failed"
                );
                MemberResult::failure(
                    member_id,
                    format!("{original}; fallback {fallback_id}: {e}"),
                )
            }
        };
        result.fallback_used = Some(fallback_id.to_string());
        result
    }

    /// One bounded, cancellable backend call.
    async fn call(
        &self,
        handle: &BackendHandle,
        task: &GroupTask,
        ctx: &ExecutionContext,
    ) -> SmartsResult<serde_json::Value> {
        let id = &handle.config.id;
        if !handle.config.enabled {
            return Err(SmartsError::Execution(format!("backend {id} is disabled")));
        }
        if ctx.is_cancelled() {
            return Err(SmartsError::Cancelled(format!("backend {id}")));
        }

        let timeout = Duration::from_millis(self.config.call_timeout_ms);
        tokio::select! {
            _ = ctx.cancelled() => Err(SmartsError::Cancelled(format!("backend {id}"))),
            outcome = tokio::time::timeout(timeout, handle.backend.execute(task, ctx)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(SmartsError::Timeout(format!(
                        "backend {id} after {}ms",
                        self.config.call_timeout_ms
                    ))),
                }
            }
        }
    }
}
