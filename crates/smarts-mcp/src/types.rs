use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smarts_core::SmartsError;
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::warn;

/// Wire transport of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Plain HTTP JSON-RPC.
    Http,
    /// Server-sent events.
    Sse,
    /// WebSocket.
    WebSocket,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Http => write!(f, "http"),
            Transport::Sse => write!(f, "sse"),
            Transport::WebSocket => write!(f, "websocket"),
        }
    }
}

/// Configuration for a single backend integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Unique backend id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Wire transport.
    pub transport: Transport,
    /// URL of the backend.
    pub endpoint: String,
    /// Capability tags the backend advertises.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Higher values are preferred.
    #[serde(default)]
    pub priority: i32,
    /// Disabled backends fail every call.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl BackendConfig {
    /// Create an enabled backend config with no capabilities.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        transport: Transport,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            transport,
            endpoint: endpoint.into(),
            capabilities: BTreeSet::new(),
            priority: 0,
            enabled: true,
        }
    }

    /// Attach capability tags.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Mark the backend disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether this backend advertises every capability in `required`.
    pub fn covers(&self, required: &[&str]) -> bool {
        required.iter().all(|cap| self.capabilities.contains(*cap))
    }
}

/// How a group runs a task across its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationStrategy {
    /// Members run one after another.
    Sequential,
    /// Members run concurrently.
    Parallel,
    /// The first member runs, then the rest see its outcome.
    Hierarchical,
}

impl CoordinationStrategy {
    /// Parse a strategy name, falling back to [`CoordinationStrategy::Sequential`]
    /// for unrecognised values. The fallback is logged.
    pub fn parse_lenient(name: &str) -> Self {
        match name.parse() {
            Ok(strategy) => strategy,
            Err(_) => {
                warn!(strategy = %name, "Unrecognised coordination strategy, using sequential");
                CoordinationStrategy::Sequential
            }
        }
    }
}

impl FromStr for CoordinationStrategy {
    type Err = SmartsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sequential" => Ok(CoordinationStrategy::Sequential),
            "parallel" => Ok(CoordinationStrategy::Parallel),
            "hierarchical" => Ok(CoordinationStrategy::Hierarchical),
            other => Err(SmartsError::Validation(format!(
                "unknown coordination strategy '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for CoordinationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinationStrategy::Sequential => write!(f, "sequential"),
            CoordinationStrategy::Parallel => write!(f, "parallel"),
            CoordinationStrategy::Hierarchical => write!(f, "hierarchical"),
        }
    }
}

/// A named set of backends executed together under one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationGroup {
    /// Unique group id.
    pub id: String,
    /// Display name; defaults to the id.
    #[serde(default)]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Backend ids, in execution order. For hierarchical groups the first
    /// member is the primary.
    pub member_ids: Vec<String>,
    /// How members are run.
    pub strategy: CoordinationStrategy,
    /// Backend that retries a failed member's branch.
    #[serde(default)]
    pub fallback_id: Option<String>,
}

impl CoordinationGroup {
    /// Create a group named after its id.
    pub fn new<I, S>(id: impl Into<String>, strategy: CoordinationStrategy, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            member_ids: members.into_iter().map(Into::into).collect(),
            strategy,
            fallback_id: None,
        }
    }

    /// Set the backend that retries failed branches.
    pub fn with_fallback(mut self, backend_id: impl Into<String>) -> Self {
        self.fallback_id = Some(backend_id.into());
        self
    }
}

/// Outcome of the primary member, handed to secondaries in a hierarchical run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentContext {
    /// Id of the primary member.
    pub backend_id: String,
    /// Whether the primary succeeded.
    pub success: bool,
    /// Output of the primary.
    pub output: Option<serde_json::Value>,
    /// Error of the primary.
    pub error: Option<String>,
}

/// The task sent to backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTask {
    /// What the backends should do.
    pub description: String,
    /// Structured input for the backends.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Set only for secondaries of a hierarchical group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentContext>,
}

impl GroupTask {
    /// A task with an empty payload.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            payload: serde_json::Value::Null,
            parent: None,
        }
    }

    /// Attach a structured payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Result of one member branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberResult {
    /// Member this entry belongs to.
    pub backend_id: String,
    /// Display name of the member, when registered.
    pub backend_name: Option<String>,
    /// Whether the branch succeeded.
    pub success: bool,
    /// Output of a successful branch.
    pub output: Option<serde_json::Value>,
    /// Error of a failed branch.
    pub error: Option<String>,
    /// Set when the group's fallback backend was tried for this entry.
    #[serde(default)]
    pub fallback_used: Option<String>,
}

impl MemberResult {
    /// A successful entry.
    pub fn success(backend_id: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_name: None,
            success: true,
            output: Some(output),
            error: None,
            fallback_used: None,
        }
    }

    /// A failed entry.
    pub fn failure(backend_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            backend_name: None,
            success: false,
            output: None,
            error: Some(error.into()),
            fallback_used: None,
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.backend_name = Some(name.into());
        self
    }

    /// Context handed to secondaries when this entry is the primary.
    pub fn as_parent(&self) -> ParentContext {
        ParentContext {
            backend_id: self.backend_id.clone(),
            success: self.success,
            output: self.output.clone(),
            error: self.error.clone(),
        }
    }
}

/// Shape of a group run: flat for sequential and parallel, split for
/// hierarchical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOutcome {
    /// One entry per member, in member order.
    Flat(Vec<MemberResult>),
    /// Primary entry and the secondaries that followed it.
    Hierarchical {
        primary: MemberResult,
        secondary: Vec<MemberResult>,
    },
}

/// Aggregated result of a group run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    /// Group that ran.
    pub group_id: String,
    /// Task the run belongs to.
    pub task_id: String,
    /// Strategy used.
    pub strategy: CoordinationStrategy,
    /// Member entries.
    pub outcome: GroupOutcome,
}

impl GroupResult {
    /// All member entries in member order (primary first for hierarchical).
    pub fn entries(&self) -> Vec<&MemberResult> {
        match &self.outcome {
            GroupOutcome::Flat(results) => results.iter().collect(),
            GroupOutcome::Hierarchical { primary, secondary } => {
                std::iter::once(primary).chain(secondary.iter()).collect()
            }
        }
    }

    /// Number of successful entries.
    pub fn success_count(&self) -> usize {
        self.entries().iter().filter(|r| r.success).count()
    }

    /// Whether every entry succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.entries().iter().all(|r| r.success)
    }
}

/// Health of a backend after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The backend answered.
    Healthy,
    /// The backend failed or timed out.
    Unhealthy,
}

/// Per-backend health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHealth {
    /// Backend checked.
    pub backend_id: String,
    /// Result of the check.
    pub status: HealthStatus,
    /// Error text of a failed check.
    pub details: Option<String>,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
}

/// Status of a managed backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    /// Backend id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Wire transport.
    pub transport: Transport,
    /// Whether calls are allowed.
    pub enabled: bool,
    /// When the backend was registered.
    pub registered_at: DateTime<Utc>,
    /// Time of the last health check.
    pub last_health_check: Option<DateTime<Utc>>,
    /// Outcome of the last health check.
    pub last_status: Option<HealthStatus>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config: BackendConfig = serde_json::from_str(
            r#"{
                "id": "desktop-primary",
                "name": "Primary Desktop",
                "transport": "sse",
                "endpoint": "http://localhost:9990/mcp"
            }"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.priority, 0);
        assert!(config.capabilities.is_empty());
        assert_eq!(config.transport, Transport::Sse);
    }

    #[test]
    fn test_covers_capabilities() {
        let config = BackendConfig::new("a", "A", Transport::Http, "http://a")
            .with_capabilities(["screenshot", "mouse"]);
        assert!(config.covers(&["mouse"]));
        assert!(config.covers(&[]));
        assert!(!config.covers(&["mouse", "keyboard"]));
    }

    #[test]
    fn test_strategy_parse_lenient_defaults_to_sequential() {
        assert_eq!(
            CoordinationStrategy::parse_lenient("Parallel"),
            CoordinationStrategy::Parallel
        );
        assert_eq!(
            CoordinationStrategy::parse_lenient("round-robin"),
            CoordinationStrategy::Sequential
        );
        assert!("mesh".parse::<CoordinationStrategy>().is_err());
    }

    #[test]
    fn test_group_result_entries_hierarchical_order() {
        let result = GroupResult {
            group_id: "g".into(),
            task_id: "t".into(),
            strategy: CoordinationStrategy::Hierarchical,
            outcome: GroupOutcome::Hierarchical {
                primary: MemberResult::success("p", serde_json::json!(1)),
                secondary: vec![
                    MemberResult::failure("s1", "down"),
                    MemberResult::success("s2", serde_json::json!(2)),
                ],
            },
        };
        let ids: Vec<&str> = result.entries().iter().map(|r| r.backend_id.as_str()).collect();
        assert_eq!(ids, vec!["p", "s1", "s2"]);
        assert_eq!(result.success_count(), 2);
        assert!(!result.all_succeeded());
    }

    #[test]
    fn test_parent_context_from_failed_primary() {
        let parent = MemberResult::failure("p", "timeout").as_parent();
        assert!(!parent.success);
        assert!(parent.output.is_none());
        assert_eq!(parent.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_group_task_omits_parent_when_absent() {
        let json = serde_json::to_value(GroupTask::new("open file")).unwrap();
        assert!(json.get("parent").is_none());
    }
}
