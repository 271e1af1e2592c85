use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use smarts_core::{AgentKind, SmartsError, SmartsResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Resources reserved for each agent of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU cores.
    pub cpu: u32,
    /// Memory in megabytes.
    pub memory_mb: u32,
    /// Storage in gigabytes.
    pub storage_gb: u32,
}

impl ResourceSpec {
    /// Create a resource spec.
    pub const fn new(cpu: u32, memory_mb: u32, storage_gb: u32) -> Self {
        Self {
            cpu,
            memory_mb,
            storage_gb,
        }
    }
}

/// Desired size of the pool for one agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Agent kind of the cluster.
    pub kind: AgentKind,
    /// Number of agents wanted.
    pub count: u32,
    /// Resources per agent.
    pub resources: ResourceSpec,
}

/// Transport agents use to talk to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommsProtocol {
    /// Persistent bidirectional connections.
    #[serde(rename = "websocket")]
    WebSocket,
    /// Request/response calls.
    #[serde(rename = "rpc")]
    Rpc,
    /// Brokered queue.
    #[serde(rename = "message-queue")]
    MessageQueue,
}

/// How work is spread across a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancing {
    /// Rotate through agents.
    RoundRobin,
    /// Pick the least busy agent.
    LeastConnections,
    /// Follow agent weights.
    Weighted,
}

/// Pool topology the system should run with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfiguration {
    /// One entry per agent kind.
    pub clusters: Vec<ClusterSpec>,
    /// Inter-agent transport.
    pub comms_protocol: CommsProtocol,
    /// Work distribution rule.
    pub load_balancing: LoadBalancing,
}

impl SystemConfiguration {
    /// Cluster for `kind`, if configured.
    pub fn cluster(&self, kind: AgentKind) -> Option<&ClusterSpec> {
        self.clusters.iter().find(|c| c.kind == kind)
    }

    /// Structural checks applied before a configuration is accepted.
    pub fn validate(&self) -> SmartsResult<()> {
        if self.clusters.is_empty() {
            return Err(SmartsError::Validation("configuration has no clusters".into()));
        }
        let mut seen = HashSet::new();
        for cluster in &self.clusters {
            if !seen.insert(cluster.kind) {
                return Err(SmartsError::Validation(format!(
                    "cluster kind '{}' appears more than once",
                    cluster.kind
                )));
            }
            let r = cluster.resources;
            if cluster.count == 0 || r.cpu == 0 || r.memory_mb == 0 || r.storage_gb == 0 {
                return Err(SmartsError::Validation(format!(
                    "cluster '{}' must have a positive count and positive resources",
                    cluster.kind
                )));
            }
        }
        Ok(())
    }
}

impl Default for SystemConfiguration {
    fn default() -> Self {
        TaskProfile::Balanced.configuration()
    }
}

/// Workload classes recognised by [`DynamicReconfigurator::classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskProfile {
    /// Heavy analysis or research.
    ComputeIntensive,
    /// Mostly screen reading.
    VisionIntensive,
    /// Mostly input actions.
    ActionIntensive,
    /// Short, simple tasks.
    Lightweight,
    /// No dominant workload.
    Balanced,
}

const PROFILE_RULES: &[(TaskProfile, &[&str])] = &[
    (
        TaskProfile::ComputeIntensive,
        &["complex", "analyze", "research", "report"],
    ),
    (
        TaskProfile::VisionIntensive,
        &["image", "screenshot", "ocr", "visual"],
    ),
    (
        TaskProfile::ActionIntensive,
        &["click", "type", "interaction", "ui"],
    ),
    (TaskProfile::Lightweight, &["quick", "simple", "fast"]),
];

fn clusters(planning: ClusterSpec, vision: ClusterSpec, action: ClusterSpec) -> Vec<ClusterSpec> {
    vec![planning, vision, action]
}

const fn sized(
    kind: AgentKind,
    count: u32,
    cpu: u32,
    memory_mb: u32,
    storage_gb: u32,
) -> ClusterSpec {
    ClusterSpec {
        kind,
        count,
        resources: ResourceSpec::new(cpu, memory_mb, storage_gb),
    }
}

impl TaskProfile {
    /// The canned configuration for this profile.
    pub fn configuration(self) -> SystemConfiguration {
        use AgentKind::{Action, Planning, Vision};
        match self {
            TaskProfile::ComputeIntensive => SystemConfiguration {
                clusters: clusters(
                    sized(Planning, 2, 4, 4096, 20),
                    sized(Vision, 2, 2, 2048, 10),
                    sized(Action, 1, 1, 512, 2),
                ),
                comms_protocol: CommsProtocol::Rpc,
                load_balancing: LoadBalancing::Weighted,
            },
            TaskProfile::VisionIntensive => SystemConfiguration {
                clusters: clusters(
                    sized(Planning, 1, 2, 2048, 10),
                    sized(Vision, 4, 2, 2048, 10),
                    sized(Action, 2, 1, 1024, 5),
                ),
                comms_protocol: CommsProtocol::WebSocket,
                load_balancing: LoadBalancing::LeastConnections,
            },
            TaskProfile::ActionIntensive => SystemConfiguration {
                clusters: clusters(
                    sized(Planning, 1, 2, 1024, 5),
                    sized(Vision, 1, 1, 512, 2),
                    sized(Action, 4, 2, 1024, 5),
                ),
                comms_protocol: CommsProtocol::MessageQueue,
                load_balancing: LoadBalancing::RoundRobin,
            },
            TaskProfile::Lightweight => SystemConfiguration {
                clusters: clusters(
                    sized(Planning, 1, 1, 512, 2),
                    sized(Vision, 1, 1, 512, 2),
                    sized(Action, 1, 1, 256, 1),
                ),
                comms_protocol: CommsProtocol::WebSocket,
                load_balancing: LoadBalancing::RoundRobin,
            },
            TaskProfile::Balanced => SystemConfiguration {
                clusters: clusters(
                    sized(Planning, 1, 2, 2048, 10),
                    sized(Vision, 2, 1, 1024, 5),
                    sized(Action, 2, 1, 512, 2),
                ),
                comms_protocol: CommsProtocol::WebSocket,
                load_balancing: LoadBalancing::RoundRobin,
            },
        }
    }
}

/// Grows the agent pool when a configuration asks for more agents.
pub trait PoolScaler: Send + Sync {
    /// Make sure at least `count` agents of `kind` exist. Returns how many
    /// were created.
    fn ensure_pool(&self, kind: AgentKind, count: usize) -> usize;
}

/// Classifies workloads and holds the active [`SystemConfiguration`].
pub struct DynamicReconfigurator {
    current: RwLock<SystemConfiguration>,
    scaler: Option<Arc<dyn PoolScaler>>,
}

impl DynamicReconfigurator {
    /// Start from the balanced configuration.
    pub fn new() -> Self {
        Self::with_configuration(SystemConfiguration::default())
    }

    /// Start from `configuration`.
    pub fn with_configuration(configuration: SystemConfiguration) -> Self {
        Self {
            current: RwLock::new(configuration),
            scaler: None,
        }
    }

    /// Attach the hook that grows pools on reconfiguration.
    pub fn with_scaler(mut self, scaler: Arc<dyn PoolScaler>) -> Self {
        self.scaler = Some(scaler);
        self
    }

    /// First profile whose keywords occur in `description`.
    pub fn classify(description: &str) -> TaskProfile {
        let lowered = description.to_lowercase();
        PROFILE_RULES
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| lowered.contains(kw)))
            .map(|(profile, _)| *profile)
            .unwrap_or(TaskProfile::Balanced)
    }

    /// Configuration suited to `description`. Balanced workloads keep the
    /// current configuration.
    pub fn analyze_task(&self, description: &str) -> SystemConfiguration {
        match Self::classify(description) {
            TaskProfile::Balanced => self.current_configuration(),
            profile => profile.configuration(),
        }
    }

    /// Validate and apply `configuration`. On rejection the active
    /// configuration is left untouched and `false` is returned.
    pub fn reconfigure(&self, configuration: SystemConfiguration) -> bool {
        if let Err(e) = configuration.validate() {
            warn!(error = %e, "Configuration rejected");
            return false;
        }

        if let Some(scaler) = &self.scaler {
            for cluster in &configuration.clusters {
                let created = scaler.ensure_pool(cluster.kind, cluster.count as usize);
                if created > 0 {
                    info!(kind = %cluster.kind, created, "Agent pool scaled up");
                }
            }
        }

        info!(
            clusters = configuration.clusters.len(),
            protocol = ?configuration.comms_protocol,
            load_balancing = ?configuration.load_balancing,
            "Configuration applied"
        );
        *self.current.write() = configuration;
        true
    }

    /// Active configuration.
    pub fn current_configuration(&self) -> SystemConfiguration {
        self.current.read().clone()
    }
}

impl Default for DynamicReconfigurator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_classify_in_rule_order() {
        assert_eq!(
            DynamicReconfigurator::classify("Research the market and click through"),
            TaskProfile::ComputeIntensive
        );
        assert_eq!(
            DynamicReconfigurator::classify("take a SCREENSHOT"),
            TaskProfile::VisionIntensive
        );
        assert_eq!(
            DynamicReconfigurator::classify("click the button"),
            TaskProfile::ActionIntensive
        );
        assert_eq!(
            DynamicReconfigurator::classify("a simple check"),
            TaskProfile::Lightweight
        );
        assert_eq!(
            DynamicReconfigurator::classify("hello"),
            TaskProfile::Balanced
        );
    }

    #[test]
    fn test_balanced_keeps_current() {
        let custom = TaskProfile::Lightweight.configuration();
        let reconfigurator = DynamicReconfigurator::with_configuration(custom.clone());
        assert_eq!(reconfigurator.analyze_task("hello"), custom);
        assert_eq!(
            reconfigurator.analyze_task("read the image").comms_protocol,
            CommsProtocol::WebSocket
        );
    }

    #[test]
    fn test_canned_profiles_are_valid() {
        for profile in [
            TaskProfile::ComputeIntensive,
            TaskProfile::VisionIntensive,
            TaskProfile::ActionIntensive,
            TaskProfile::Lightweight,
            TaskProfile::Balanced,
        ] {
            profile.configuration().validate().unwrap();
        }
        let compute = TaskProfile::ComputeIntensive.configuration();
        assert_eq!(compute.cluster(AgentKind::Planning).unwrap().resources.memory_mb, 4096);
    }

    #[test]
    fn test_zero_count_rejected_and_state_kept() {
        let reconfigurator = DynamicReconfigurator::new();
        let before = reconfigurator.current_configuration();
        let mut bad = TaskProfile::VisionIntensive.configuration();
        bad.clusters[1].count = 0;
        assert!(!reconfigurator.reconfigure(bad));
        assert_eq!(reconfigurator.current_configuration(), before);
    }

    #[test]
    fn test_empty_and_duplicate_clusters_rejected() {
        let reconfigurator = DynamicReconfigurator::new();
        let mut empty = SystemConfiguration::default();
        empty.clusters.clear();
        assert!(!reconfigurator.reconfigure(empty));

        let mut dup = SystemConfiguration::default();
        dup.clusters.push(dup.clusters[0]);
        assert!(!reconfigurator.reconfigure(dup));

        let mut no_memory = SystemConfiguration::default();
        no_memory.clusters[2].resources.memory_mb = 0;
        assert!(!reconfigurator.reconfigure(no_memory));
    }

    #[test]
    fn test_unknown_protocol_fails_to_parse() {
        let raw = serde_json::json!({
            "clusters": [{"kind": "vision", "count": 1,
                          "resources": {"cpu": 1, "memory_mb": 512, "storage_gb": 1}}],
            "comms_protocol": "carrier-pigeon",
            "load_balancing": "round-robin"
        });
        assert!(serde_json::from_value::<SystemConfiguration>(raw).is_err());
    }

    #[test]
    fn test_apply_replaces_and_scales() {
        #[derive(Default)]
        struct RecordingScaler(Mutex<Vec<(AgentKind, usize)>>);

        impl PoolScaler for RecordingScaler {
            fn ensure_pool(&self, kind: AgentKind, count: usize) -> usize {
                self.0.lock().push((kind, count));
                0
            }
        }

        let scaler = Arc::new(RecordingScaler::default());
        let reconfigurator = DynamicReconfigurator::new().with_scaler(scaler.clone());
        let target = TaskProfile::ActionIntensive.configuration();
        assert!(reconfigurator.reconfigure(target.clone()));
        assert_eq!(reconfigurator.current_configuration(), target);
        assert!(scaler.0.lock().contains(&(AgentKind::Action, 4)));
        assert_eq!(scaler.0.lock().len(), 3);
    }
}
