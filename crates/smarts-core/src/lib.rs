//! Core types and error definitions for the SMARTS dispatch framework.
//!
//! This crate provides the foundational types shared across all SMARTS crates:
//! the unified error type, the task/result data model and the [`Agent`]
//! capability trait every worker implementation must satisfy.
//!
//! # Main types
//!
//! - [`SmartsError`]: Unified error enum for all SMARTS subsystems.
//! - [`SmartsResult`]: Convenience alias for `Result<T, SmartsError>`.
//! - [`AgentKind`]: Capability class used to match subtasks to agents.
//! - [`Subtask`]: One unit of decomposed work.
//! - [`TaskResult`]: The outcome of one subtask attempt.
//! - [`Agent`]: Trait implemented by every worker.
//! - [`ExecutionContext`]: Task id plus cancellation signal passed to workers.

/// The agent capability trait and its execution context.
pub mod agent;
/// Task, result and metrics data model.
pub mod task;

pub use agent::{Agent, ExecutionContext};
pub use task::{
    AgentDescriptor, AgentKind, AgentMetrics, PerformanceReport, Subtask, TaskResult,
};

// --- Error types ---

/// Top-level error type for the SMARTS framework.
///
/// Each variant corresponds to one class of failure. `UnknownEntity` and
/// `Validation` are never fatal; `Execution`, `Timeout`, `Cancelled` and
/// `Http` are converted into failed results at the orchestrator and
/// coordinator boundaries.
#[derive(Debug, thiserror::Error)]
pub enum SmartsError {
    /// An operation referenced an agent, backend, group or component id that
    /// is not registered.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// An agent or backend call failed.
    #[error("Execution error: {0}")]
    Execution(String),

    /// An agent or backend call did not finish within its time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The call was cancelled through its [`ExecutionContext`].
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A configuration, group or component version failed structural checks.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error in configuration parsing.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request to a backend.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SmartsError {
    /// Whether this error represents a failed execution attempt (as opposed
    /// to a lookup or validation problem).
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            SmartsError::Execution(_)
                | SmartsError::Timeout(_)
                | SmartsError::Cancelled(_)
                | SmartsError::Http(_)
        )
    }
}

/// A convenience `Result` alias using [`SmartsError`].
pub type SmartsResult<T> = Result<T, SmartsError>;
