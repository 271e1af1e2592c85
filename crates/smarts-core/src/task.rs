use crate::SmartsError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// Capability class of an agent or subtask, used for dispatch matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Screen reading, OCR, element detection.
    Vision,
    /// Mouse and keyboard interaction.
    Action,
    /// Decomposition, sequencing, resource allocation.
    Planning,
    /// Performance analysis and optimisation.
    Learning,
}

impl AgentKind {
    /// Every kind, in declaration order.
    pub const ALL: [AgentKind; 4] = [
        AgentKind::Vision,
        AgentKind::Action,
        AgentKind::Planning,
        AgentKind::Learning,
    ];

    /// Lower-case name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Vision => "vision",
            AgentKind::Action => "action",
            AgentKind::Planning => "planning",
            AgentKind::Learning => "learning",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = SmartsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "vision" => Ok(AgentKind::Vision),
            "action" => Ok(AgentKind::Action),
            "planning" => Ok(AgentKind::Planning),
            "learning" => Ok(AgentKind::Learning),
            other => Err(SmartsError::Validation(format!("unknown agent kind '{other}'"))),
        }
    }
}

/// Static identity of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique id within the registry.
    pub id: String,
    /// Kind of work the agent accepts.
    pub kind: AgentKind,
    /// Semantic version of the agent implementation.
    pub version: String,
    /// Free-form capability tags.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl AgentDescriptor {
    /// Create a descriptor with no capability tags.
    pub fn new(id: impl Into<String>, kind: AgentKind, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            version: version.into(),
            capabilities: BTreeSet::new(),
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

    /// Whether the agent advertises the given capability tag.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Running performance record of an agent.
///
/// `success_rate` is the fraction of successful executions over
/// `total_executions`; `avg_execution_time_ms` is the mean over the
/// `timed_executions` that reported a duration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Fraction of successful executions, in `[0, 1]`.
    pub success_rate: f64,
    /// Mean duration of timed executions, in milliseconds.
    pub avg_execution_time_ms: f64,
    /// Executions recorded so far.
    pub total_executions: u64,
    /// Executions that reported a duration.
    #[serde(default)]
    pub timed_executions: u64,
}

impl AgentMetrics {
    /// Seed metrics from an existing history where every execution was timed.
    pub fn new(success_rate: f64, avg_execution_time_ms: f64, total_executions: u64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            avg_execution_time_ms: avg_execution_time_ms.max(0.0),
            total_executions,
            timed_executions: total_executions,
        }
    }

    /// Starting point for freshly created agents.
    pub fn neutral() -> Self {
        Self::new(0.5, 0.0, 0)
    }

    /// Fold one execution outcome into the running record.
    pub fn record(&mut self, report: &PerformanceReport) {
        let old_total = self.total_executions as f64;
        let hit = if report.success { 1.0 } else { 0.0 };
        self.success_rate =
            ((self.success_rate * old_total + hit) / (old_total + 1.0)).clamp(0.0, 1.0);

        if let Some(ms) = report.execution_time_ms {
            let timed = self.timed_executions as f64;
            self.avg_execution_time_ms =
                (self.avg_execution_time_ms * timed + ms as f64) / (timed + 1.0);
            self.timed_executions += 1;
        }

        self.total_executions += 1;
    }
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Outcome of a single execution, fed back into an agent's metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// Whether the execution succeeded.
    pub success: bool,
    /// Wall-clock duration, when measured.
    pub execution_time_ms: Option<u64>,
    /// Self-reported accuracy in `[0, 1]`.
    pub accuracy: Option<f64>,
    /// Error message of a failed execution.
    pub error: Option<String>,
}

impl PerformanceReport {
    /// A successful outcome.
    pub fn success(execution_time_ms: Option<u64>, accuracy: Option<f64>) -> Self {
        Self {
            success: true,
            execution_time_ms,
            accuracy,
            error: None,
        }
    }

    /// A failed outcome carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            execution_time_ms: None,
            accuracy: None,
            error: Some(error.into()),
        }
    }

    /// Derive a report from a produced result.
    pub fn from_result(result: &TaskResult) -> Self {
        Self {
            success: result.success,
            execution_time_ms: result.execution_time_ms,
            accuracy: result.accuracy,
            error: result.error.clone(),
        }
    }
}

/// One unit of decomposed work.
///
/// `priority` is an ordering hint only (lower = more foundational); dispatch
/// follows decomposition order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Id unique within one decomposition, e.g. `vision-1`.
    pub id: String,
    /// Agent kind that should handle it.
    pub kind: AgentKind,
    /// Human-readable description of the work.
    pub description: String,
    /// Ordering hint; lower is more foundational.
    pub priority: u8,
}

impl Subtask {
    /// Create a subtask.
    pub fn new(
        id: impl Into<String>,
        kind: AgentKind,
        description: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            priority,
        }
    }
}

/// Result of one subtask attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Opaque output of the worker.
    pub payload: serde_json::Value,
    /// Wall-clock duration, when measured.
    pub execution_time_ms: Option<u64>,
    /// Self-reported accuracy in `[0, 1]`.
    pub accuracy: Option<f64>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error message of a failed attempt.
    pub error: Option<String>,
    /// Agent that produced this result (stamped by the orchestrator).
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Subtask this result answers (stamped by the orchestrator).
    #[serde(default)]
    pub subtask_id: Option<String>,
    /// True when the result came from the alternative or fallback agent.
    #[serde(default)]
    pub recovered: bool,
}

impl TaskResult {
    /// A successful result carrying `payload`.
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            payload,
            execution_time_ms: None,
            accuracy: None,
            success: true,
            error: None,
            agent_id: None,
            subtask_id: None,
            recovered: false,
        }
    }

    /// A failed result with an error message and an empty payload.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            payload: serde_json::Value::Null,
            execution_time_ms: None,
            accuracy: None,
            success: false,
            error: Some(error.into()),
            agent_id: None,
            subtask_id: None,
            recovered: false,
        }
    }

    /// Set the measured duration.
    pub fn with_execution_time(mut self, ms: u64) -> Self {
        self.execution_time_ms = Some(ms);
        self
    }

    /// Set the accuracy, clamped to `[0, 1]`.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy.clamp(0.0, 1.0));
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_through_str() {
        for kind in AgentKind::ALL {
            assert_eq!(kind.as_str().parse::<AgentKind>().unwrap(), kind);
        }
        assert_eq!(" Vision ".parse::<AgentKind>().unwrap(), AgentKind::Vision);
        assert!("x".parse::<AgentKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&AgentKind::Planning).unwrap();
        assert_eq!(json, "\"planning\"");
    }

    #[test]
    fn test_metrics_record_success_rate() {
        let mut m = AgentMetrics::new(0.5, 0.0, 2);
        m.record(&PerformanceReport::success(None, None));
        assert_eq!(m.total_executions, 3);
        assert!((m.success_rate - 2.0 / 3.0).abs() < 1e-9);
        m.record(&PerformanceReport::failure("boom"));
        assert_eq!(m.total_executions, 4);
        assert!((m.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_mean_only_counts_timed_runs() {
        let mut m = AgentMetrics::neutral();
        m.record(&PerformanceReport::success(Some(100), None));
        m.record(&PerformanceReport::failure("no timing"));
        m.record(&PerformanceReport::success(Some(300), None));
        assert_eq!(m.total_executions, 3);
        assert_eq!(m.timed_executions, 2);
        assert!((m.avg_execution_time_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_fresh_metrics_first_success() {
        let mut m = AgentMetrics::neutral();
        m.record(&PerformanceReport::success(Some(40), None));
        assert!((m.success_rate - 1.0).abs() < 1e-9);
        assert!((m.avg_execution_time_ms - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_descriptor_capabilities() {
        let d = AgentDescriptor::new("vision-agent-1", AgentKind::Vision, "1.0.0")
            .with_capabilities(["ocr", "element-detection"]);
        assert!(d.has_capability("ocr"));
        assert!(!d.has_capability("keyboard-input"));
    }

    #[test]
    fn test_task_result_builders() {
        let ok = TaskResult::success(serde_json::json!({"clicked": true}))
            .with_execution_time(200)
            .with_accuracy(1.5);
        assert!(ok.success);
        assert_eq!(ok.execution_time_ms, Some(200));
        assert_eq!(ok.accuracy, Some(1.0));

        let failed = TaskResult::failure("element not found");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("element not found"));
        assert!(failed.payload.is_null());
    }
}
