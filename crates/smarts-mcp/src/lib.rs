//! Backend integrations and coordination groups for SMARTS.
//!
//! Backends are named integrations (desktop-control servers, file services,
//! remote workers) registered with a [`BackendManager`]. A [`Coordinator`]
//! runs one task across a [`CoordinationGroup`] of backends with a
//! sequential, parallel or hierarchical strategy, isolating each member's
//! failure.
//!
//! # Main types
//!
//! - [`Backend`]: Trait every integration implements.
//! - [`BackendManager`]: Registration, lookup, capability selection and health checks.
//! - [`Coordinator`]: Executes coordination groups.
//! - [`HttpBackend`]: JSON-RPC over HTTP transport.

/// The backend trait.
pub mod backend;
/// Group execution strategies.
pub mod coordinator;
/// HTTP transport.
pub mod http;
/// Backend and group registry with health checks.
pub mod manager;
/// JSON-RPC 2.0 envelopes.
pub mod protocol;
/// Backend, group and result types.
pub mod types;

pub use backend::Backend;
pub use coordinator::{Coordinator, CoordinatorConfig};
pub use http::HttpBackend;
pub use manager::{BackendHandle, BackendManager};
pub use types::{
    BackendConfig, BackendHealth, BackendStatus, CoordinationGroup, CoordinationStrategy,
    GroupOutcome, GroupResult, GroupTask, HealthStatus, MemberResult, ParentContext, Transport,
};
