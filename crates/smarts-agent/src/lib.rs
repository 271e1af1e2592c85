//! Worker agents for SMARTS.
//!
//! Workers do their primitive work through the [`Driver`] interface, which is
//! the only point where this workspace touches a real desktop. The crate also
//! provides the synthetic [`FallbackAgent`] and the default agent catalog.

/// Default agent pool, capability sets and agent construction.
pub mod catalog;
/// The computer-control driver interface.
pub mod driver;
/// The dead-letter fallback agent.
pub mod fallback;
/// Driver-backed worker agent.
pub mod worker;

pub use catalog::{build_agent, capabilities_for, default_pool, generate_agent_id, SeededAgent};
pub use driver::{DryRunDriver, Driver};
pub use fallback::{FallbackAgent, FALLBACK_AGENT_ID};
pub use worker::DriverAgent;
