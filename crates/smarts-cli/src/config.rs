//! `smarts.toml` loading.
//!
//! Every section is optional; a missing file or an empty one yields the
//! library defaults.

use serde::Deserialize;
use smarts_mcp::{BackendConfig, CoordinationGroup, CoordinationStrategy, CoordinatorConfig};
use smarts_orchestrator::{
    AgentRegistry, EvolutionConfig, HotSwapConfig, OrchestratorConfig, DEFAULT_TIME_CEILING_MS,
};
use std::path::Path;

/// Top-level host configuration.
#[derive(Debug, Default, Deserialize)]
pub struct SmartsConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub evolution: EvolutionConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub hot_swap: HotSwapConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

/// `[registry]` section, applied when the agent registry is built.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Average execution time at which an agent's speed score reaches zero.
    #[serde(default = "default_time_ceiling_ms")]
    pub time_ceiling_ms: f64,
}

fn default_time_ceiling_ms() -> f64 {
    DEFAULT_TIME_CEILING_MS
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            time_ceiling_ms: default_time_ceiling_ms(),
        }
    }
}

/// A `[[groups]]` entry. The strategy is kept as text so that an unknown
/// name degrades to sequential instead of failing the whole file.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub members: Vec<String>,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default)]
    pub fallback: Option<String>,
}

fn default_strategy() -> String {
    "sequential".to_string()
}

impl RegistryConfig {
    /// An empty registry scored against this ceiling.
    pub fn build(&self) -> AgentRegistry {
        AgentRegistry::new().with_time_ceiling_ms(self.time_ceiling_ms)
    }
}

impl GroupConfig {
    pub fn to_group(&self) -> CoordinationGroup {
        let mut group = CoordinationGroup::new(
            self.id.clone(),
            CoordinationStrategy::parse_lenient(&self.strategy),
            self.members.clone(),
        );
        if !self.name.is_empty() {
            group.name = self.name.clone();
        }
        group.description = self.description.clone();
        if let Some(fallback) = &self.fallback {
            group = group.with_fallback(fallback.clone());
        }
        group
    }
}

impl SmartsConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, or return defaults when no path was given.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Self::parse(&text)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use smarts_mcp::Transport;
    use std::io::Write;

    const SAMPLE: &str = r#"
[orchestrator]
execution_timeout_ms = 5000
auto_reconfigure = false

[evolution]
min_samples = 20

[coordinator]
call_timeout_ms = 1500

[[backends]]
id = "browser"
name = "Browser automation"
transport = "http"
endpoint = "http://127.0.0.1:7001/rpc"
capabilities = ["navigate", "click"]
priority = 5

[[backends]]
id = "ocr"
name = "OCR"
transport = "sse"
endpoint = "http://127.0.0.1:7002/events"
enabled = false

[[groups]]
id = "read-then-act"
members = ["ocr", "browser"]
strategy = "hierarchical"
fallback = "browser"

[[groups]]
id = "fan-out"
members = ["browser", "ocr"]
strategy = "round-robin"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = SmartsConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.orchestrator.execution_timeout_ms, 5000);
        assert!(!config.orchestrator.auto_reconfigure);
        assert_eq!(config.registry.time_ceiling_ms, 10_000.0);
        assert_eq!(config.evolution.min_samples, 20);
        assert_eq!(config.evolution.window, 50);
        assert_eq!(config.coordinator.call_timeout_ms, 1500);
        assert_eq!(config.hot_swap.deploy_timeout_ms, 10_000);

        assert_eq!(config.backends.len(), 2);
        assert_eq!(config.backends[0].transport, Transport::Http);
        assert_eq!(config.backends[0].priority, 5);
        assert!(config.backends[0].enabled);
        assert!(!config.backends[1].enabled);
    }

    #[test]
    fn test_group_conversion() {
        let config = SmartsConfig::parse(SAMPLE).unwrap();
        let group = config.groups[0].to_group();
        assert_eq!(group.strategy, CoordinationStrategy::Hierarchical);
        assert_eq!(group.member_ids, vec!["ocr", "browser"]);
        assert_eq!(group.fallback_id.as_deref(), Some("browser"));

        let lenient = config.groups[1].to_group();
        assert_eq!(lenient.strategy, CoordinationStrategy::Sequential);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = SmartsConfig::parse("").unwrap();
        assert_eq!(config.orchestrator.execution_timeout_ms, 30_000);
        assert!(config.orchestrator.auto_reconfigure);
        assert!(config.backends.is_empty());
        assert!(config.groups.is_empty());
    }

    #[test]
    fn test_registry_ceiling_reaches_registry() {
        let config = SmartsConfig::parse("[registry]\ntime_ceiling_ms = 4000.0\n").unwrap();
        assert_eq!(config.registry.time_ceiling_ms, 4000.0);

        let registry = config.registry.build();
        assert_eq!(registry.time_ceiling_ms(), 4000.0);
    }

    #[test]
    fn test_unknown_transport_is_rejected() {
        let text = r#"
[[backends]]
id = "x"
name = "x"
transport = "carrier-pigeon"
endpoint = "coop://1"
"#;
        assert!(SmartsConfig::parse(text).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = SmartsConfig::load(Some(file.path())).await.unwrap();
        assert_eq!(config.groups.len(), 2);
    }

    #[tokio::test]
    async fn test_load_without_path_and_missing_file() {
        let config = SmartsConfig::load(None).await.unwrap();
        assert_eq!(config.coordinator.call_timeout_ms, 30_000);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("smarts.toml");
        let err = SmartsConfig::load(Some(&missing)).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
