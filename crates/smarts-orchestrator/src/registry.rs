use parking_lot::Mutex;
use serde::Serialize;
use smarts_agent::{FallbackAgent, FALLBACK_AGENT_ID};
use smarts_core::{Agent, AgentDescriptor, AgentKind, AgentMetrics, PerformanceReport};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default average execution time at which the speed component reaches zero.
pub const DEFAULT_TIME_CEILING_MS: f64 = 10_000.0;

const SUCCESS_WEIGHT: f64 = 0.7;
const SPEED_WEIGHT: f64 = 0.3;

/// Score of an agent with `metrics`: `0.7 * success_rate + 0.3 * speed`, where
/// speed falls linearly from 1 at 0 ms to 0 at `time_ceiling_ms`.
pub fn score(metrics: &AgentMetrics, time_ceiling_ms: f64) -> f64 {
    let speed = if time_ceiling_ms > 0.0 {
        (1.0 - metrics.avg_execution_time_ms / time_ceiling_ms).max(0.0)
    } else {
        0.0
    };
    SUCCESS_WEIGHT * metrics.success_rate + SPEED_WEIGHT * speed
}

/// Point-in-time view of one registered agent.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    /// Identity of the agent.
    pub descriptor: AgentDescriptor,
    /// Current metrics.
    pub metrics: AgentMetrics,
    /// Score under the registry ceiling.
    pub score: f64,
}

struct Entry {
    agent: Arc<dyn Agent>,
    kind: AgentKind,
    metrics: AgentMetrics,
    seq: u64,
}

#[derive(Default)]
struct Inner {
    agents: HashMap<String, Entry>,
    by_kind: HashMap<AgentKind, Vec<String>>,
    next_seq: u64,
}

impl Inner {
    /// Ids of `kind` ordered best first; equal scores keep registration order.
    fn ranked(&self, kind: AgentKind, ceiling: f64) -> Vec<(&str, &Entry)> {
        let mut ranked: Vec<(&str, &Entry)> = self
            .by_kind
            .get(&kind)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.agents.get(id).map(|e| (id.as_str(), e)))
                    .collect()
            })
            .unwrap_or_default();
        ranked.sort_by(|(_, a), (_, b)| {
            score(&b.metrics, ceiling)
                .total_cmp(&score(&a.metrics, ceiling))
                .then(a.seq.cmp(&b.seq))
        });
        ranked
    }

    /// Insert or replace under the caller's lock. `None` keeps the metrics
    /// already held for the id, or starts neutral.
    fn insert(
        &mut self,
        agent: Arc<dyn Agent>,
        metrics: Option<AgentMetrics>,
    ) -> (String, AgentKind) {
        let descriptor = agent.descriptor();
        let id = descriptor.id.clone();
        let kind = descriptor.kind;

        let previous = self.agents.get(&id).map(|e| (e.kind, e.seq, e.metrics));
        let (seq, kept) = match previous {
            Some((old_kind, seq, kept)) => {
                if old_kind != kind {
                    self.remove_from_bucket(old_kind, &id);
                }
                (seq, Some(kept))
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                (seq, None)
            }
        };
        let metrics = metrics.or(kept).unwrap_or_else(AgentMetrics::neutral);

        let bucket = self.by_kind.entry(kind).or_default();
        if !bucket.iter().any(|existing| *existing == id) {
            bucket.push(id.clone());
        }
        self.agents.insert(
            id.clone(),
            Entry {
                agent,
                kind,
                metrics,
                seq,
            },
        );
        (id, kind)
    }

    fn remove_from_bucket(&mut self, kind: AgentKind, id: &str) {
        if let Some(bucket) = self.by_kind.get_mut(&kind) {
            bucket.retain(|existing| existing != id);
            if bucket.is_empty() {
                self.by_kind.remove(&kind);
            }
        }
    }
}

/// Registry of live agents and their performance metrics.
///
/// The id map and the per-kind index sit behind one mutex so they are never
/// observed out of step. Agents are cloned out of the lock before use.
pub struct AgentRegistry {
    inner: Mutex<Inner>,
    time_ceiling_ms: f64,
    fallback: Arc<dyn Agent>,
}

impl AgentRegistry {
    /// Create an empty registry with the default ceiling.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            time_ceiling_ms: DEFAULT_TIME_CEILING_MS,
            fallback: Arc::new(FallbackAgent::new()),
        }
    }

    /// Set the time ceiling used for scoring.
    pub fn with_time_ceiling_ms(mut self, ceiling_ms: f64) -> Self {
        self.time_ceiling_ms = ceiling_ms;
        self
    }

    /// Time ceiling used for scoring.
    pub fn time_ceiling_ms(&self) -> f64 {
        self.time_ceiling_ms
    }

    /// Register `agent` with neutral metrics, or replace the agent under the
    /// same id while keeping its metrics.
    pub fn register(&self, agent: Arc<dyn Agent>) {
        let (id, kind) = {
            let mut inner = self.inner.lock();
            inner.insert(agent, None)
        };
        info!(agent_id = %id, kind = %kind, "Agent registered");
    }

    /// Register `agent` with explicit starting metrics.
    ///
    /// Re-registering an id keeps its original registration position. If the
    /// kind changed, the id moves to the new kind's bucket.
    pub fn register_with_metrics(&self, agent: Arc<dyn Agent>, metrics: AgentMetrics) {
        let (id, kind) = {
            let mut inner = self.inner.lock();
            inner.insert(agent, Some(metrics))
        };
        info!(agent_id = %id, kind = %kind, "Agent registered");
    }

    /// Remove an agent. Returns `false` if the id is unknown.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let entry = inner.agents.remove(id);
            if let Some(entry) = &entry {
                inner.remove_from_bucket(entry.kind, id);
            }
            entry.is_some()
        };
        if removed {
            info!(agent_id = %id, "Agent unregistered");
        } else {
            warn!(agent_id = %id, "Cannot unregister unknown agent");
        }
        removed
    }

    /// Best agent for `kind`, or the primary fallback when none is registered.
    pub fn select_for_type(&self, kind: AgentKind) -> Arc<dyn Agent> {
        let selected = {
            let inner = self.inner.lock();
            inner
                .ranked(kind, self.time_ceiling_ms)
                .first()
                .map(|(_, e)| e.agent.clone())
        };
        match selected {
            Some(agent) => agent,
            None => {
                debug!(kind = %kind, "No agent of kind registered, using primary fallback");
                self.primary_fallback()
            }
        }
    }

    /// Runner-up for `kind`. `None` when fewer than two agents of that kind
    /// are registered.
    pub fn select_alternative(&self, kind: AgentKind) -> Option<Arc<dyn Agent>> {
        let inner = self.inner.lock();
        inner
            .ranked(kind, self.time_ceiling_ms)
            .get(1)
            .map(|(_, e)| e.agent.clone())
    }

    /// The earliest-registered agent still present, or the synthetic
    /// [`FallbackAgent`] when the registry is empty.
    pub fn primary_fallback(&self) -> Arc<dyn Agent> {
        let inner = self.inner.lock();
        inner
            .agents
            .values()
            .min_by_key(|e| e.seq)
            .map(|e| e.agent.clone())
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Fold one execution outcome into an agent's metrics. Unknown ids are
    /// ignored with a warning.
    pub fn update_metrics(&self, id: &str, report: &PerformanceReport) {
        let updated = self.inner.lock().agents.get_mut(id).map(|entry| {
            entry.metrics.record(report);
            entry.metrics
        });
        match updated {
            Some(m) => {
                debug!(
                    agent_id = %id,
                    success = report.success,
                    success_rate = m.success_rate,
                    avg_ms = m.avg_execution_time_ms,
                    total = m.total_executions,
                    "Agent metrics updated"
                );
            }
            None => {
                warn!(agent_id = %id, "Metrics update for unknown agent ignored");
            }
        }
    }

    /// Registered agent with `id`.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.inner.lock().agents.get(id).map(|e| e.agent.clone())
    }

    /// Metrics for `id`. The synthetic fallback reports its nominal record
    /// unless an agent was registered under its id.
    pub fn metrics(&self, id: &str) -> Option<AgentMetrics> {
        let held = self.inner.lock().agents.get(id).map(|e| e.metrics);
        match held {
            None if id == FALLBACK_AGENT_ID => Some(FallbackAgent::nominal_metrics()),
            held => held,
        }
    }

    /// Current score of `id`.
    pub fn score_of(&self, id: &str) -> Option<f64> {
        self.metrics(id).map(|m| score(&m, self.time_ceiling_ms))
    }

    /// Every agent in registration order.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        let inner = self.inner.lock();
        let mut entries: Vec<&Entry> = inner.agents.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries
            .into_iter()
            .map(|e| AgentSnapshot {
                descriptor: e.agent.descriptor().clone(),
                metrics: e.metrics,
                score: score(&e.metrics, self.time_ceiling_ms),
            })
            .collect()
    }

    /// Ids of `kind` in bucket order.
    pub fn agents_of_kind(&self, kind: AgentKind) -> Vec<String> {
        self.inner
            .lock()
            .by_kind
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of agents of `kind`.
    pub fn count_of_kind(&self, kind: AgentKind) -> usize {
        self.inner.lock().by_kind.get(&kind).map_or(0, Vec::len)
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        self.inner.lock().agents.len()
    }

    /// Whether no agent is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().agents.is_empty()
    }

    /// Check that the id map and the kind index agree.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let inner = self.inner.lock();
        let indexed: usize = inner.by_kind.values().map(Vec::len).sum();
        indexed == inner.agents.len()
            && inner.by_kind.iter().all(|(kind, ids)| {
                ids.iter()
                    .all(|id| inner.agents.get(id).is_some_and(|e| e.kind == *kind))
            })
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use smarts_core::{ExecutionContext, SmartsResult, Subtask, TaskResult};

    struct NamedAgent {
        descriptor: AgentDescriptor,
    }

    #[async_trait]
    impl Agent for NamedAgent {
        fn descriptor(&self) -> &AgentDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _s: &Subtask, _c: &ExecutionContext) -> SmartsResult<TaskResult> {
            Ok(TaskResult::success(serde_json::Value::Null))
        }
    }

    fn agent(id: &str, kind: AgentKind) -> Arc<dyn Agent> {
        Arc::new(NamedAgent {
            descriptor: AgentDescriptor::new(id, kind, "1.0.0"),
        })
    }

    #[test]
    fn test_score_formula() {
        let s = score(&AgentMetrics::new(0.95, 300.0, 100), DEFAULT_TIME_CEILING_MS);
        assert!((s - 0.956).abs() < 1e-9);
        let slow = score(&AgentMetrics::new(1.0, 20_000.0, 1), DEFAULT_TIME_CEILING_MS);
        assert!((slow - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_higher_score_wins() {
        let registry = AgentRegistry::new();
        registry.register_with_metrics(
            agent("vision-agent-2", AgentKind::Vision),
            AgentMetrics::new(0.92, 350.0, 85),
        );
        registry.register_with_metrics(
            agent("vision-agent-1", AgentKind::Vision),
            AgentMetrics::new(0.95, 300.0, 100),
        );
        let selected = registry.select_for_type(AgentKind::Vision);
        assert_eq!(selected.descriptor().id, "vision-agent-1");
        let alt = registry.select_alternative(AgentKind::Vision).unwrap();
        assert_eq!(alt.descriptor().id, "vision-agent-2");
    }

    #[test]
    fn test_ties_go_to_first_registered() {
        let registry = AgentRegistry::new();
        let m = AgentMetrics::new(0.9, 100.0, 10);
        registry.register_with_metrics(agent("b", AgentKind::Action), m);
        registry.register_with_metrics(agent("a", AgentKind::Action), m);
        for _ in 0..5 {
            assert_eq!(registry.select_for_type(AgentKind::Action).descriptor().id, "b");
        }
    }

    #[test]
    fn test_alternative_needs_two_agents() {
        let registry = AgentRegistry::new();
        assert!(registry.select_alternative(AgentKind::Action).is_none());
        registry.register(agent("only", AgentKind::Action));
        assert!(registry.select_alternative(AgentKind::Action).is_none());
    }

    #[test]
    fn test_synthetic_fallback_reports_nominal_metrics() {
        let registry = AgentRegistry::new();
        let m = registry.metrics(FALLBACK_AGENT_ID).unwrap();
        assert_eq!(m.success_rate, 1.0);
        assert_eq!(m.total_executions, 0);
        assert!((registry.score_of(FALLBACK_AGENT_ID).unwrap() - 1.0).abs() < 1e-9);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_empty_kind_uses_primary_fallback() {
        let registry = AgentRegistry::new();
        assert_eq!(
            registry.select_for_type(AgentKind::Vision).descriptor().id,
            FALLBACK_AGENT_ID
        );

        registry.register(agent("planner", AgentKind::Planning));
        registry.register(agent("actor", AgentKind::Action));
        assert_eq!(
            registry.select_for_type(AgentKind::Vision).descriptor().id,
            "planner"
        );

        registry.unregister("planner");
        assert_eq!(registry.primary_fallback().descriptor().id, "actor");
    }

    #[test]
    fn test_overwrite_moves_kind_and_keeps_position() {
        let registry = AgentRegistry::new();
        registry.register(agent("x", AgentKind::Vision));
        registry.register(agent("y", AgentKind::Vision));
        registry.register(agent("x", AgentKind::Action));

        assert_eq!(registry.agents_of_kind(AgentKind::Vision), vec!["y"]);
        assert_eq!(registry.agents_of_kind(AgentKind::Action), vec!["x"]);
        assert_eq!(registry.primary_fallback().descriptor().id, "x");
        assert_eq!(registry.len(), 2);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_register_is_idempotent_and_keeps_metrics() {
        let registry = AgentRegistry::new();
        registry.register_with_metrics(
            agent("a", AgentKind::Action),
            AgentMetrics::new(0.9, 200.0, 50),
        );
        registry.register(agent("a", AgentKind::Action));
        assert_eq!(registry.count_of_kind(AgentKind::Action), 1);
        assert_eq!(registry.metrics("a").unwrap().total_executions, 50);
    }

    #[test]
    fn test_unregister_unknown_returns_false() {
        let registry = AgentRegistry::new();
        assert!(!registry.unregister("ghost"));
        registry.register(agent("a", AgentKind::Learning));
        assert!(registry.unregister("a"));
        assert!(registry.is_empty());
        assert_eq!(registry.count_of_kind(AgentKind::Learning), 0);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_register_unregister_sequences_stay_consistent() {
        let registry = AgentRegistry::new();
        let kinds = AgentKind::ALL;
        for round in 0..40u32 {
            let id = format!("agent-{}", round % 7);
            let kind = kinds[(round as usize * 3) % kinds.len()];
            if round % 5 == 4 {
                registry.unregister(&id);
            } else {
                registry.register(agent(&id, kind));
            }
            assert!(registry.is_consistent(), "inconsistent after round {round}");
        }
    }

    #[test]
    fn test_update_metrics_increments_total() {
        let registry = AgentRegistry::new();
        registry.register_with_metrics(
            agent("a", AgentKind::Action),
            AgentMetrics::new(1.0, 100.0, 1),
        );
        registry.update_metrics("a", &PerformanceReport::failure("boom"));
        let m = registry.metrics("a").unwrap();
        assert_eq!(m.total_executions, 2);
        assert!((m.success_rate - 0.5).abs() < 1e-9);
        assert_eq!(m.avg_execution_time_ms, 100.0);

        registry.update_metrics("a", &PerformanceReport::success(Some(400), None));
        let m = registry.metrics("a").unwrap();
        assert_eq!(m.total_executions, 3);
        assert!((m.avg_execution_time_ms - 250.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&m.success_rate));
    }

    #[test]
    fn test_reregister_during_updates_loses_no_executions() {
        const UPDATES: u64 = 20_000;
        let registry = AgentRegistry::new();
        registry.register_with_metrics(
            agent("a", AgentKind::Action),
            AgentMetrics::new(1.0, 100.0, 0),
        );

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let report = PerformanceReport::success(Some(100), None);
                for _ in 0..UPDATES {
                    registry.update_metrics("a", &report);
                }
            });
            scope.spawn(|| {
                for _ in 0..2_000 {
                    registry.register(agent("a", AgentKind::Action));
                }
            });
        });

        let m = registry.metrics("a").unwrap();
        assert_eq!(m.total_executions, UPDATES);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn test_update_metrics_unknown_is_noop() {
        let registry = AgentRegistry::new();
        registry.update_metrics("ghost", &PerformanceReport::success(Some(1), None));
        assert!(registry.metrics("ghost").is_none());
    }

    #[test]
    fn test_snapshot_in_registration_order() {
        let registry = AgentRegistry::new().with_time_ceiling_ms(1_000.0);
        registry.register(agent("z", AgentKind::Vision));
        registry.register(agent("a", AgentKind::Action));
        let snapshot = registry.snapshot();
        let ids: Vec<&str> = snapshot.iter().map(|s| s.descriptor.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
        assert!((snapshot[0].score - 0.65).abs() < 1e-9);
    }
}
