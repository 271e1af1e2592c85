//! Task dispatch core for SMARTS.
//!
//! Decomposes task descriptions into typed subtasks, routes each to the best
//! scoring agent of its kind, recovers failures through an alternative agent
//! and the primary fallback, and feeds outcomes back into pool evolution.
//! Reconfiguration and hot swapping of components sit alongside.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Entry point: decompose, dispatch, recover, evolve.
//! - [`AgentRegistry`]: Live agents, their metrics and score-based selection.
//! - [`TaskDecomposer`]: Splits descriptions into subtasks ([`KeywordDecomposer`]).
//! - [`DynamicReconfigurator`]: Workload classification and pool topology.
//! - [`EvolutionEngine`]: Performance history and generation cycles.
//! - [`HotSwapManager`]: Versioned component replacement with rollback.
//! - [`AgentFactory`]: Creates and registers driver-backed agents.

/// Task decomposition.
pub mod decomposer;
/// Orchestration engine and its configuration.
pub mod engine;
/// Performance history and pool evolution.
pub mod evolution;
/// Agent creation and default pool seeding.
pub mod factory;
/// Versioned component replacement.
pub mod hot_swap;
/// Workload classification and system configuration.
pub mod reconfigurator;
/// Agent registry and scoring.
pub mod registry;

pub use decomposer::{KeywordDecomposer, TaskDecomposer};
pub use engine::{Orchestrator, OrchestratorConfig};
pub use evolution::{
    AgentSpawner, AlwaysEvolve, EvolutionConfig, EvolutionEngine, EvolutionPolicy, EvolutionStats,
    GenerationReport, NeverEvolve, OffspringConfig, ThresholdPolicy,
};
pub use factory::AgentFactory;
pub use hot_swap::{
    ComponentRelease, ComponentVersion, Deployer, HotSwapConfig, HotSwapManager, NoopDeployer,
};
pub use reconfigurator::{
    ClusterSpec, CommsProtocol, DynamicReconfigurator, LoadBalancing, PoolScaler, ResourceSpec,
    SystemConfiguration, TaskProfile,
};
pub use registry::{score, AgentRegistry, AgentSnapshot, DEFAULT_TIME_CEILING_MS};
