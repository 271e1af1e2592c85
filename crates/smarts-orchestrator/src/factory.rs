use crate::evolution::AgentSpawner;
use crate::reconfigurator::PoolScaler;
use crate::registry::AgentRegistry;
use smarts_agent::{build_agent, default_pool, generate_agent_id, Driver};
use smarts_core::{AgentKind, AgentMetrics};
use std::sync::Arc;
use tracing::info;

const DEFAULT_AGENT_VERSION: &str = "1.0.0";

/// Creates driver-backed agents and registers them.
pub struct AgentFactory {
    registry: Arc<AgentRegistry>,
    driver: Arc<dyn Driver>,
    version: String,
}

impl AgentFactory {
    /// Create a factory that registers into `registry`.
    pub fn new(registry: Arc<AgentRegistry>, driver: Arc<dyn Driver>) -> Self {
        Self {
            registry,
            driver,
            version: DEFAULT_AGENT_VERSION.to_string(),
        }
    }

    /// Version stamped on agents created by the spawner and scaler hooks.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Seed the registry with the default pool and its historical metrics.
    pub fn register_defaults(&self) -> usize {
        let pool = default_pool(self.driver.clone());
        let count = pool.len();
        for seeded in pool {
            self.registry.register_with_metrics(seeded.agent, seeded.metrics);
        }
        info!(count, "Default agent pool registered");
        count
    }

    /// Register a fresh agent of `kind` with neutral metrics and return its id.
    pub fn create_agent(&self, kind: AgentKind, version: &str) -> String {
        let id = generate_agent_id(kind);
        let agent = build_agent(id.clone(), kind, version, self.driver.clone());
        self.registry.register_with_metrics(agent, AgentMetrics::neutral());
        info!(agent_id = %id, kind = %kind, version = %version, "Agent created");
        id
    }

    /// Remove an agent. Returns `false` if the id is unknown.
    pub fn remove_agent(&self, id: &str) -> bool {
        self.registry.unregister(id)
    }
}

impl AgentSpawner for AgentFactory {
    fn spawn_agent(&self, kind: AgentKind) -> Option<String> {
        Some(self.create_agent(kind, &self.version))
    }
}

impl PoolScaler for AgentFactory {
    fn ensure_pool(&self, kind: AgentKind, count: usize) -> usize {
        let mut created = 0;
        while self.registry.count_of_kind(kind) < count {
            self.create_agent(kind, &self.version);
            created += 1;
        }
        created
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use smarts_agent::DryRunDriver;

    fn factory() -> (Arc<AgentRegistry>, AgentFactory) {
        let registry = Arc::new(AgentRegistry::new());
        let factory = AgentFactory::new(registry.clone(), Arc::new(DryRunDriver));
        (registry, factory)
    }

    #[test]
    fn test_register_defaults() {
        let (registry, factory) = factory();
        assert_eq!(factory.register_defaults(), 6);
        assert_eq!(registry.count_of_kind(AgentKind::Vision), 2);
        assert_eq!(
            registry.select_for_type(AgentKind::Vision).descriptor().id,
            "vision-agent-1"
        );
        assert_eq!(
            registry.primary_fallback().descriptor().id,
            "planning-agent-1"
        );
    }

    #[test]
    fn test_create_and_remove() {
        let (registry, factory) = factory();
        let id = factory.create_agent(AgentKind::Learning, "2.1.0");
        let agent = registry.get(&id).unwrap();
        assert_eq!(agent.descriptor().version, "2.1.0");
        assert_eq!(registry.metrics(&id).unwrap(), AgentMetrics::neutral());
        assert!(factory.remove_agent(&id));
        assert!(!factory.remove_agent(&id));
    }

    #[test]
    fn test_ensure_pool_only_grows() {
        let (registry, factory) = factory();
        factory.register_defaults();
        assert_eq!(factory.ensure_pool(AgentKind::Action, 4), 2);
        assert_eq!(registry.count_of_kind(AgentKind::Action), 4);
        assert_eq!(factory.ensure_pool(AgentKind::Action, 1), 0);
        assert_eq!(registry.count_of_kind(AgentKind::Action), 4);
    }

    #[test]
    fn test_spawner_uses_configured_version() {
        let (registry, factory) = factory();
        let factory = factory.with_version("3.0.0");
        let id = factory.spawn_agent(AgentKind::Vision).unwrap();
        assert_eq!(registry.get(&id).unwrap().descriptor().version, "3.0.0");
    }
}
