use crate::backend::Backend;
use crate::types::{
    BackendConfig, BackendHealth, BackendStatus, CoordinationGroup, HealthStatus,
};
use chrono::{DateTime, Utc};
use smarts_core::{SmartsError, SmartsResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// A backend configuration together with its live implementation.
#[derive(Clone)]
pub struct BackendHandle {
    /// Registered configuration.
    pub config: BackendConfig,
    /// Live implementation.
    pub backend: Arc<dyn Backend>,
}

impl std::fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendHandle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Internal state for a managed backend.
struct ManagedBackend {
    seq: u64,
    handle: BackendHandle,
    registered_at: DateTime<Utc>,
    last_health_check: Option<DateTime<Utc>>,
    last_status: Option<HealthStatus>,
}

struct ManagedGroup {
    seq: u64,
    group: CoordinationGroup,
}

/// Owns backend registrations and coordination groups.
pub struct BackendManager {
    backends: RwLock<HashMap<String, ManagedBackend>>,
    groups: RwLock<HashMap<String, ManagedGroup>>,
    seq: AtomicU64,
    health_timeout: Duration,
}

impl BackendManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            seq: AtomicU64::new(0),
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }

    /// Bound each backend's health probe.
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a backend. Re-registering an id replaces its config and
    /// implementation but keeps its original position.
    pub async fn register_backend(&self, config: BackendConfig, backend: Arc<dyn Backend>) {
        let id = config.id.clone();
        let mut backends = self.backends.write().await;
        let seq = backends
            .get(&id)
            .map(|existing| existing.seq)
            .unwrap_or_else(|| self.next_seq());
        info!(
            backend = %id,
            transport = %config.transport,
            enabled = config.enabled,
            "Backend registered"
        );
        backends.insert(
            id,
            ManagedBackend {
                seq,
                handle: BackendHandle { config, backend },
                registered_at: Utc::now(),
                last_health_check: None,
                last_status: None,
            },
        );
    }

    /// Remove a backend. Returns `false` if the id was not registered.
    pub async fn unregister_backend(&self, id: &str) -> bool {
        let removed = self.backends.write().await.remove(id).is_some();
        if removed {
            info!(backend = %id, "Backend unregistered");
        } else {
            warn!(backend = %id, "Cannot unregister unknown backend");
        }
        removed
    }

    /// Look up a backend by id.
    pub async fn get_backend(&self, id: &str) -> Option<BackendHandle> {
        self.backends.read().await.get(id).map(|m| m.handle.clone())
    }

    /// Status of every backend, in registration order.
    pub async fn list_backends(&self) -> Vec<BackendStatus> {
        let backends = self.backends.read().await;
        let mut managed: Vec<&ManagedBackend> = backends.values().collect();
        managed.sort_by_key(|m| m.seq);
        managed
            .into_iter()
            .map(|m| BackendStatus {
                id: m.handle.config.id.clone(),
                name: m.handle.config.name.clone(),
                transport: m.handle.config.transport,
                enabled: m.handle.config.enabled,
                registered_at: m.registered_at,
                last_health_check: m.last_health_check,
                last_status: m.last_status,
            })
            .collect()
    }

    /// Enabled backends advertising every capability in `required`, highest
    /// priority first. Equal priorities keep registration order.
    pub async fn select_for_capabilities(&self, required: &[&str]) -> Vec<BackendConfig> {
        let backends = self.backends.read().await;
        let mut matching: Vec<&ManagedBackend> = backends
            .values()
            .filter(|m| m.handle.config.enabled && m.handle.config.covers(required))
            .collect();
        matching.sort_by(|a, b| {
            b.handle
                .config
                .priority
                .cmp(&a.handle.config.priority)
                .then(a.seq.cmp(&b.seq))
        });
        matching.into_iter().map(|m| m.handle.config.clone()).collect()
    }

    /// Create or replace a coordination group.
    ///
    /// Members that are not registered yet are accepted; they fail at
    /// execution time.
    pub async fn create_group(&self, group: CoordinationGroup) -> SmartsResult<()> {
        if group.id.trim().is_empty() {
            return Err(SmartsError::Validation("group id must not be empty".into()));
        }
        if group.member_ids.is_empty() {
            return Err(SmartsError::Validation(format!(
                "group '{}' has no members",
                group.id
            )));
        }

        {
            let backends = self.backends.read().await;
            for member in &group.member_ids {
                if !backends.contains_key(member) {
                    warn!(group = %group.id, backend = %member, "Group member is not registered");
                }
            }
        }

        let mut groups = self.groups.write().await;
        let seq = groups
            .get(&group.id)
            .map(|existing| existing.seq)
            .unwrap_or_else(|| self.next_seq());
        info!(
            group = %group.id,
            strategy = %group.strategy,
            members = group.member_ids.len(),
            "Coordination group created"
        );
        groups.insert(group.id.clone(), ManagedGroup { seq, group });
        Ok(())
    }

    /// Look up a group by id.
    pub async fn get_group(&self, id: &str) -> Option<CoordinationGroup> {
        self.groups.read().await.get(id).map(|m| m.group.clone())
    }

    /// All groups, in creation order.
    pub async fn list_groups(&self) -> Vec<CoordinationGroup> {
        let groups = self.groups.read().await;
        let mut managed: Vec<&ManagedGroup> = groups.values().collect();
        managed.sort_by_key(|m| m.seq);
        managed.into_iter().map(|m| m.group.clone()).collect()
    }

    /// Remove a group. Returns `false` if the id is unknown.
    pub async fn remove_group(&self, id: &str) -> bool {
        let removed = self.groups.write().await.remove(id).is_some();
        if !removed {
            warn!(group = %id, "Cannot remove unknown group");
        }
        removed
    }

    /// Probe every backend and record the outcome.
    ///
    /// Probes run outside the lock. Disabled backends are reported unhealthy
    /// without being contacted.
    pub async fn health_check(&self) -> Vec<BackendHealth> {
        let handles: Vec<BackendHandle> = {
            let backends = self.backends.read().await;
            let mut managed: Vec<&ManagedBackend> = backends.values().collect();
            managed.sort_by_key(|m| m.seq);
            managed.into_iter().map(|m| m.handle.clone()).collect()
        };

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            let id = handle.config.id.clone();
            let (status, details) = if !handle.config.enabled {
                (HealthStatus::Unhealthy, Some("backend disabled".to_string()))
            } else {
                match tokio::time::timeout(self.health_timeout, handle.backend.health_check()).await
                {
                    Ok(Ok(())) => (HealthStatus::Healthy, None),
                    Ok(Err(e)) => {
                        warn!(backend = %id, error = %e, "Backend health check failed");
                        (HealthStatus::Unhealthy, Some(e.to_string()))
                    }
                    Err(_) => {
                        warn!(backend = %id, "Backend health check timed out");
                        (
                            HealthStatus::Unhealthy,
                            Some(format!(
                                "health check timed out after {}ms",
                                self.health_timeout.as_millis()
                            )),
                        )
                    }
                }
            };

            let checked_at = Utc::now();
            if let Some(managed) = self.backends.write().await.get_mut(&id) {
                managed.last_health_check = Some(checked_at);
                managed.last_status = Some(status);
            }
            reports.push(BackendHealth {
                backend_id: id,
                status,
                details,
                checked_at,
            });
        }
        reports
    }

    /// Run [`health_check`](Self::health_check) every `interval` until
    /// `cancel` fires.
    pub fn start_health_loop(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Backend health loop stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        self.health_check().await;
                    }
                }
            }
        })
    }
}

impl Default for BackendManager {
    fn default() -> Self {
        Self::new()
    }
}
