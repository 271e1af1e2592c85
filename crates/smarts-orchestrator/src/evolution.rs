use crate::registry::{AgentRegistry, AgentSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smarts_core::{AgentKind, TaskResult};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Mutation rate given to an agent that has not been a parent yet.
pub const BASE_MUTATION_RATE: f64 = 0.1;
/// Upper bound for any mutation rate.
pub const MAX_MUTATION_RATE: f64 = 0.5;

/// Evolution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Maximum number of samples kept.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Number of most recent samples the policy looks at.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Samples needed in the window before the policy may evolve.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    /// Evolve when the windowed success ratio falls below this.
    #[serde(default = "default_success_floor")]
    pub success_floor: f64,
    /// Best agents of each kind that produce offspring per generation.
    #[serde(default = "default_parents_per_kind")]
    pub parents_per_kind: usize,
    /// Agents scoring below this are retired when their kind has others.
    #[serde(default = "default_retire_below")]
    pub retire_below: f64,
}

fn default_history_limit() -> usize {
    1000
}
fn default_window() -> usize {
    50
}
fn default_min_samples() -> usize {
    10
}
fn default_success_floor() -> f64 {
    0.8
}
fn default_parents_per_kind() -> usize {
    2
}
fn default_retire_below() -> f64 {
    0.3
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            window: default_window(),
            min_samples: default_min_samples(),
            success_floor: default_success_floor(),
            parents_per_kind: default_parents_per_kind(),
            retire_below: default_retire_below(),
        }
    }
}

/// One execution outcome kept for evolutionary analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Task the outcome belongs to.
    pub task_id: String,
    /// Agent that produced it.
    pub agent_id: Option<String>,
    /// Whether it succeeded.
    pub success: bool,
    /// Measured duration.
    pub execution_time_ms: Option<u64>,
    /// Self-reported accuracy.
    pub accuracy: Option<f64>,
    /// When the sample was taken.
    pub recorded_at: DateTime<Utc>,
}

/// Summary of the recent window handed to an [`EvolutionPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvolutionStats {
    /// Samples in the window.
    pub window_samples: usize,
    /// Successful samples in the window.
    pub window_successes: usize,
    /// Successes over samples; zero for an empty window.
    pub success_ratio: f64,
    /// Mean duration of timed samples in the window.
    pub avg_execution_time_ms: Option<f64>,
    /// Samples held in history.
    pub total_samples: usize,
    /// Generations completed so far.
    pub generation: u64,
}

/// Decides whether a generation should run.
pub trait EvolutionPolicy: Send + Sync {
    /// Whether a generation should run for `stats`.
    fn should_evolve(&self, stats: &EvolutionStats) -> bool;
}

/// Evolve once enough samples show the success ratio under a floor.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    /// Samples needed before evolving.
    pub min_samples: usize,
    /// Evolve below this success ratio.
    pub success_floor: f64,
}

impl From<&EvolutionConfig> for ThresholdPolicy {
    fn from(config: &EvolutionConfig) -> Self {
        Self {
            min_samples: config.min_samples,
            success_floor: config.success_floor,
        }
    }
}

impl EvolutionPolicy for ThresholdPolicy {
    fn should_evolve(&self, stats: &EvolutionStats) -> bool {
        stats.window_samples >= self.min_samples && stats.success_ratio < self.success_floor
    }
}

/// Policy that never evolves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverEvolve;

impl EvolutionPolicy for NeverEvolve {
    fn should_evolve(&self, _stats: &EvolutionStats) -> bool {
        false
    }
}

/// Policy that evolves on every evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysEvolve;

impl EvolutionPolicy for AlwaysEvolve {
    fn should_evolve(&self, _stats: &EvolutionStats) -> bool {
        true
    }
}

/// Creates replacement agents for retired ones.
pub trait AgentSpawner: Send + Sync {
    /// Register a fresh agent of `kind` and return its id.
    fn spawn_agent(&self, kind: AgentKind) -> Option<String>;
}

/// Configuration derived from a parent during a generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OffspringConfig {
    /// Agent the offspring derives from.
    pub parent_id: String,
    /// Kind of the parent.
    pub kind: AgentKind,
    /// Parent score at selection time.
    pub parent_fitness: f64,
    /// Mutation rate handed to the offspring.
    pub mutation_rate: f64,
}

/// Outcome of one generation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    /// Generation number, starting at 1.
    pub generation: u64,
    /// Agents scored.
    pub evaluated: usize,
    /// Offspring configurations produced.
    pub offspring: Vec<OffspringConfig>,
    /// Agents retired.
    pub retired: Vec<String>,
    /// Replacements spawned.
    pub spawned: Vec<String>,
}

/// Offspring mutation rate: weaker parents mutate more, capped at
/// [`MAX_MUTATION_RATE`].
pub fn offspring_mutation_rate(parent_rate: f64, fitness: f64) -> f64 {
    let fitness = fitness.clamp(0.0, 1.0);
    (parent_rate * (1.0 + 0.2 * (1.0 - fitness))).min(MAX_MUTATION_RATE)
}

/// Collects execution outcomes and evolves the agent pool when the policy
/// asks for it.
pub struct EvolutionEngine {
    registry: Arc<AgentRegistry>,
    config: EvolutionConfig,
    policy: Arc<dyn EvolutionPolicy>,
    spawner: Option<Arc<dyn AgentSpawner>>,
    history: Mutex<VecDeque<PerformanceSample>>,
    mutation_rates: Mutex<HashMap<String, f64>>,
    generation: AtomicU64,
}

impl EvolutionEngine {
    /// Create an engine using a [`ThresholdPolicy`] built from `config`.
    pub fn new(registry: Arc<AgentRegistry>, config: EvolutionConfig) -> Self {
        let policy = Arc::new(ThresholdPolicy::from(&config));
        Self {
            registry,
            config,
            policy,
            spawner: None,
            history: Mutex::new(VecDeque::new()),
            mutation_rates: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Replace the evolution policy.
    pub fn with_policy(mut self, policy: Arc<dyn EvolutionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Attach the hook that replaces retired agents.
    pub fn with_spawner(mut self, spawner: Arc<dyn AgentSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Generations completed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Samples currently held.
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }

    /// Current mutation rate of `agent_id`.
    pub fn mutation_rate(&self, agent_id: &str) -> f64 {
        self.mutation_rates
            .lock()
            .get(agent_id)
            .copied()
            .unwrap_or(BASE_MUTATION_RATE)
    }

    /// Record `results` for `task_id` and run a generation if the policy
    /// says so.
    pub fn evaluate_and_evolve(
        &self,
        task_id: &str,
        results: &[TaskResult],
    ) -> Option<GenerationReport> {
        self.record(task_id, results);
        let stats = self.stats();
        debug!(
            task_id = %task_id,
            window = stats.window_samples,
            success_ratio = stats.success_ratio,
            "Evaluated task performance"
        );
        if self.policy.should_evolve(&stats) {
            Some(self.run_generation())
        } else {
            None
        }
    }

    fn record(&self, task_id: &str, results: &[TaskResult]) {
        let now = Utc::now();
        let mut history = self.history.lock();
        for result in results {
            history.push_back(PerformanceSample {
                task_id: task_id.to_string(),
                agent_id: result.agent_id.clone(),
                success: result.success,
                execution_time_ms: result.execution_time_ms,
                accuracy: result.accuracy,
                recorded_at: now,
            });
        }
        while history.len() > self.config.history_limit {
            history.pop_front();
        }
    }

    /// Statistics over the most recent window.
    pub fn stats(&self) -> EvolutionStats {
        let history = self.history.lock();
        let window: Vec<&PerformanceSample> =
            history.iter().rev().take(self.config.window).collect();
        let successes = window.iter().filter(|s| s.success).count();
        let timed: Vec<u64> = window.iter().filter_map(|s| s.execution_time_ms).collect();
        EvolutionStats {
            window_samples: window.len(),
            window_successes: successes,
            success_ratio: if window.is_empty() {
                1.0
            } else {
                successes as f64 / window.len() as f64
            },
            avg_execution_time_ms: if timed.is_empty() {
                None
            } else {
                Some(timed.iter().sum::<u64>() as f64 / timed.len() as f64)
            },
            total_samples: history.len(),
            generation: self.generation(),
        }
    }

    /// Run one generation over the current pool: pick the fittest agents of
    /// each kind as parents, derive offspring configurations, retire agents
    /// below the retirement score and ask the spawner for replacements.
    pub fn run_generation(&self) -> GenerationReport {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(generation, "Evolution cycle started");

        let snapshot = self.registry.snapshot();
        let mut by_kind: BTreeMap<AgentKind, Vec<AgentSnapshot>> = BTreeMap::new();
        for agent in snapshot.iter() {
            by_kind
                .entry(agent.descriptor.kind)
                .or_default()
                .push(agent.clone());
        }

        let mut report = GenerationReport {
            generation,
            evaluated: snapshot.len(),
            ..Default::default()
        };

        for (kind, mut agents) in by_kind {
            // Stable sort keeps registration order among equal scores.
            agents.sort_by(|a, b| b.score.total_cmp(&a.score));

            for parent in agents.iter().take(self.config.parents_per_kind) {
                let id = &parent.descriptor.id;
                let rate = offspring_mutation_rate(self.mutation_rate(id), parent.score);
                self.mutation_rates.lock().insert(id.clone(), rate);
                report.offspring.push(OffspringConfig {
                    parent_id: id.clone(),
                    kind,
                    parent_fitness: parent.score,
                    mutation_rate: rate,
                });
            }

            let mut remaining = agents.len();
            for weak in agents.iter().rev() {
                if weak.score >= self.config.retire_below || remaining <= 1 {
                    break;
                }
                let id = &weak.descriptor.id;
                if self.registry.unregister(id) {
                    remaining -= 1;
                    self.mutation_rates.lock().remove(id);
                    info!(generation, agent_id = %id, score = weak.score, "Agent retired");
                    report.retired.push(id.clone());
                    if let Some(spawned) = self.spawner.as_ref().and_then(|s| s.spawn_agent(kind)) {
                        info!(
                            generation,
                            agent_id = %spawned,
                            kind = %kind,
                            "Replacement agent spawned"
                        );
                        report.spawned.push(spawned);
                    }
                }
            }
        }

        info!(
            generation,
            evaluated = report.evaluated,
            offspring = report.offspring.len(),
            retired = report.retired.len(),
            "Evolution cycle completed"
        );
        report
    }
}
