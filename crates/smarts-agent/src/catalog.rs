use crate::driver::Driver;
use crate::worker::DriverAgent;
use smarts_core::{Agent, AgentDescriptor, AgentKind, AgentMetrics};
use std::sync::Arc;
use uuid::Uuid;

/// An agent together with the metrics it should be registered with.
pub struct SeededAgent {
    /// Agent to register.
    pub agent: Arc<dyn Agent>,
    /// Historical metrics it starts from.
    pub metrics: AgentMetrics,
}

/// Capability tags advertised by every agent of `kind`.
pub fn capabilities_for(kind: AgentKind) -> &'static [&'static str] {
    match kind {
        AgentKind::Vision => &["ocr", "element-detection", "screenshot-analysis"],
        AgentKind::Action => &["mouse-control", "keyboard-input", "ui-interaction"],
        AgentKind::Planning => &["task-decomposition", "resource-allocation", "sequencing"],
        AgentKind::Learning => &["performance-analysis", "optimization", "pattern-recognition"],
    }
}

/// Build a driver-backed agent with the standard capability set for its kind.
pub fn build_agent(
    id: impl Into<String>,
    kind: AgentKind,
    version: impl Into<String>,
    driver: Arc<dyn Driver>,
) -> Arc<dyn Agent> {
    let descriptor = AgentDescriptor::new(id, kind, version)
        .with_capabilities(capabilities_for(kind).iter().copied());
    Arc::new(DriverAgent::new(descriptor, driver))
}

/// Fresh, unique id for a newly created agent of `kind`.
pub fn generate_agent_id(kind: AgentKind) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{kind}-{}", &suffix[..12])
}

/// The default pool: two vision, two action, one planning and one learning
/// agent, seeded with their historical metrics. Registration order matters:
/// the first entry becomes the registry's primary fallback.
pub fn default_pool(driver: Arc<dyn Driver>) -> Vec<SeededAgent> {
    let seeds: [(&str, AgentKind, f64, f64, u64); 6] = [
        ("planning-agent-1", AgentKind::Planning, 0.99, 500.0, 150),
        ("vision-agent-1", AgentKind::Vision, 0.95, 300.0, 100),
        ("vision-agent-2", AgentKind::Vision, 0.92, 350.0, 85),
        ("action-agent-1", AgentKind::Action, 0.98, 200.0, 200),
        ("action-agent-2", AgentKind::Action, 0.96, 220.0, 180),
        ("learning-agent-1", AgentKind::Learning, 0.90, 400.0, 75),
    ];

    seeds
        .into_iter()
        .map(|(id, kind, rate, avg, total)| SeededAgent {
            agent: build_agent(id, kind, "1.0.0", driver.clone()),
            metrics: AgentMetrics::new(rate, avg, total),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DryRunDriver;

    #[test]
    fn test_default_pool_composition() {
        let pool = default_pool(Arc::new(DryRunDriver));
        assert_eq!(pool.len(), 6);
        let count = |k: AgentKind| pool.iter().filter(|s| s.agent.descriptor().kind == k).count();
        assert_eq!(count(AgentKind::Vision), 2);
        assert_eq!(count(AgentKind::Action), 2);
        assert_eq!(count(AgentKind::Planning), 1);
        assert_eq!(count(AgentKind::Learning), 1);
    }

    #[test]
    fn test_planning_agent_leads_the_pool() {
        let pool = default_pool(Arc::new(DryRunDriver));
        assert_eq!(pool[0].agent.descriptor().id, "planning-agent-1");
    }

    #[test]
    fn test_built_agent_has_kind_capabilities() {
        let agent = build_agent("action-x", AgentKind::Action, "2.0.0", Arc::new(DryRunDriver));
        let d = agent.descriptor();
        assert_eq!(d.version, "2.0.0");
        assert!(d.has_capability("keyboard-input"));
        assert_eq!(d.capabilities.len(), 3);
    }

    #[test]
    fn test_generated_ids_are_unique_and_prefixed() {
        let a = generate_agent_id(AgentKind::Vision);
        let b = generate_agent_id(AgentKind::Vision);
        assert_ne!(a, b);
        assert!(a.starts_with("vision-"));
    }
}
