use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smarts_core::{SmartsError, SmartsResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// One deployed version of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVersion {
    /// Component this version belongs to.
    pub component_id: String,
    /// Version string.
    pub version: String,
    /// Deployment payload.
    pub payload: serde_json::Value,
    /// When the version was recorded.
    pub timestamp: DateTime<Utc>,
}

/// A version offered for deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRelease {
    /// Version string.
    pub version: String,
    /// Deployment payload.
    pub payload: serde_json::Value,
}

impl ComponentRelease {
    /// A release of `version` carrying `payload`.
    pub fn new(version: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            version: version.into(),
            payload,
        }
    }
}

/// Puts component versions into service.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Put `candidate` into service.
    async fn deploy(&self, candidate: &ComponentVersion) -> SmartsResult<()>;

    /// Bring `previous` back after a failed deploy.
    async fn restore(&self, previous: &ComponentVersion) -> SmartsResult<()>;

    /// Take down a component that had no prior version.
    async fn retire(&self, component_id: &str) -> SmartsResult<()>;
}

/// In-process deployer that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDeployer;

#[async_trait]
impl Deployer for NoopDeployer {
    async fn deploy(&self, _candidate: &ComponentVersion) -> SmartsResult<()> {
        Ok(())
    }

    async fn restore(&self, _previous: &ComponentVersion) -> SmartsResult<()> {
        Ok(())
    }

    async fn retire(&self, _component_id: &str) -> SmartsResult<()> {
        Ok(())
    }
}

/// Hot-swap settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotSwapConfig {
    /// Upper bound for each deployer call.
    #[serde(default = "default_deploy_timeout_ms")]
    pub deploy_timeout_ms: u64,
}

fn default_deploy_timeout_ms() -> u64 {
    10_000
}

impl Default for HotSwapConfig {
    fn default() -> Self {
        Self {
            deploy_timeout_ms: default_deploy_timeout_ms(),
        }
    }
}

/// Versioned replacement of running components with rollback.
///
/// A swap is validate, backup, deploy, then either record the new version or
/// restore the backup. History only grows on a successful deploy, so a failed
/// swap leaves [`current_version`](Self::current_version) where it was.
pub struct HotSwapManager {
    history: Mutex<HashMap<String, Vec<ComponentVersion>>>,
    swap_lock: tokio::sync::Mutex<()>,
    deployer: Arc<dyn Deployer>,
    config: HotSwapConfig,
}

impl HotSwapManager {
    /// Create a manager driving `deployer`.
    pub fn new(deployer: Arc<dyn Deployer>) -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            swap_lock: tokio::sync::Mutex::new(()),
            deployer,
            config: HotSwapConfig::default(),
        }
    }

    /// Override the default settings.
    pub fn with_config(mut self, config: HotSwapConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace `component_id` with `release`. Returns `true` when the new
    /// version is live.
    pub async fn swap(&self, component_id: &str, release: ComponentRelease) -> bool {
        let _serialised = self.swap_lock.lock().await;

        let backup = self.current_version(component_id);
        if let Err(e) = validate(component_id, &release, backup.as_ref()) {
            warn!(component = %component_id, error = %e, "Swap rejected");
            return false;
        }

        let candidate = ComponentVersion {
            component_id: component_id.to_string(),
            version: release.version,
            payload: release.payload,
            timestamp: Utc::now(),
        };

        match self.deploy(&candidate).await {
            Ok(()) => {
                info!(
                    component = %component_id,
                    version = %candidate.version,
                    previous = backup.as_ref().map(|b| b.version.as_str()).unwrap_or("none"),
                    "Component swapped"
                );
                self.history
                    .lock()
                    .entry(component_id.to_string())
                    .or_default()
                    .push(candidate);
                true
            }
            Err(e) => {
                error!(
                    component = %component_id,
                    version = %candidate.version,
                    error = %e,
                    "Deploy failed, rolling back"
                );
                self.rollback(component_id, backup.as_ref()).await;
                false
            }
        }
    }

    async fn deploy(&self, candidate: &ComponentVersion) -> SmartsResult<()> {
        let timeout = Duration::from_millis(self.config.deploy_timeout_ms);
        match tokio::time::timeout(timeout, self.deployer.deploy(candidate)).await {
            Ok(result) => result,
            Err(_) => Err(SmartsError::Timeout(format!(
                "deploy of {} {} after {}ms",
                candidate.component_id, candidate.version, self.config.deploy_timeout_ms
            ))),
        }
    }

    async fn rollback(&self, component_id: &str, backup: Option<&ComponentVersion>) {
        let restored = match backup {
            Some(previous) => self.deployer.restore(previous).await,
            None => self.deployer.retire(component_id).await,
        };
        match restored {
            Ok(()) => info!(
                component = %component_id,
                version = backup.map(|b| b.version.as_str()).unwrap_or("none"),
                "Rollback complete"
            ),
            Err(e) => error!(component = %component_id, error = %e, "Rollback failed"),
        }
    }

    /// Every recorded version of `component_id`, oldest first.
    pub fn version_history(&self, component_id: &str) -> Vec<ComponentVersion> {
        self.history
            .lock()
            .get(component_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Latest successfully deployed version.
    pub fn current_version(&self, component_id: &str) -> Option<ComponentVersion> {
        self.history
            .lock()
            .get(component_id)
            .and_then(|versions| versions.last().cloned())
    }

    /// Ids of every component with at least one version, sorted.
    pub fn components(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.history.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for HotSwapManager {
    fn default() -> Self {
        Self::new(Arc::new(NoopDeployer))
    }
}

fn validate(
    component_id: &str,
    release: &ComponentRelease,
    current: Option<&ComponentVersion>,
) -> SmartsResult<()> {
    if component_id.trim().is_empty() {
        return Err(SmartsError::Validation("component id must not be empty".into()));
    }
    if release.version.trim().is_empty() {
        return Err(SmartsError::Validation("version must not be empty".into()));
    }
    if release.payload.is_null() {
        return Err(SmartsError::Validation("payload must not be null".into()));
    }
    if current.is_some_and(|c| c.version == release.version) {
        return Err(SmartsError::Validation(format!(
            "version {} is already deployed",
            release.version
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Fails deploys of one version and records rollback calls.
    #[derive(Default)]
    struct FlakyDeployer {
        bad_version: String,
        restored: Mutex<Vec<String>>,
        retired: Mutex<Vec<String>>,
    }

    impl FlakyDeployer {
        fn failing_on(version: &str) -> Arc<Self> {
            Arc::new(Self {
                bad_version: version.to_string(),
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl Deployer for FlakyDeployer {
        async fn deploy(&self, candidate: &ComponentVersion) -> SmartsResult<()> {
            if candidate.version == self.bad_version {
                Err(SmartsError::Execution("health probe failed".into()))
            } else {
                Ok(())
            }
        }

        async fn restore(&self, previous: &ComponentVersion) -> SmartsResult<()> {
            self.restored.lock().push(previous.version.clone());
            Ok(())
        }

        async fn retire(&self, component_id: &str) -> SmartsResult<()> {
            self.retired.lock().push(component_id.to_string());
            Ok(())
        }
    }

    struct HangingDeployer;

    #[async_trait]
    impl Deployer for HangingDeployer {
        async fn deploy(&self, _candidate: &ComponentVersion) -> SmartsResult<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn restore(&self, _previous: &ComponentVersion) -> SmartsResult<()> {
            Ok(())
        }

        async fn retire(&self, _component_id: &str) -> SmartsResult<()> {
            Ok(())
        }
    }

    fn release(version: &str) -> ComponentRelease {
        ComponentRelease::new(version, json!({"build": version}))
    }

    #[tokio::test]
    async fn test_successful_swaps_append_history() {
        let manager = HotSwapManager::default();
        assert!(manager.swap("vision-model", release("1.0.0")).await);
        assert!(manager.swap("vision-model", release("1.1.0")).await);

        let history = manager.version_history("vision-model");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, "1.0.0");
        assert_eq!(manager.current_version("vision-model").unwrap().version, "1.1.0");
        assert_eq!(manager.components(), vec!["vision-model"]);
    }

    #[tokio::test]
    async fn test_failed_deploy_restores_previous() {
        let deployer = FlakyDeployer::failing_on("2.0.0");
        let manager = HotSwapManager::new(deployer.clone());
        assert!(manager.swap("planner", release("1.0.0")).await);

        assert!(!manager.swap("planner", release("2.0.0")).await);
        assert_eq!(manager.current_version("planner").unwrap().version, "1.0.0");
        assert_eq!(manager.version_history("planner").len(), 1);
        assert_eq!(*deployer.restored.lock(), vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_failed_first_deploy_retires() {
        let deployer = FlakyDeployer::failing_on("0.1.0");
        let manager = HotSwapManager::new(deployer.clone());
        assert!(!manager.swap("ocr", release("0.1.0")).await);
        assert!(manager.current_version("ocr").is_none());
        assert_eq!(*deployer.retired.lock(), vec!["ocr"]);
    }

    #[tokio::test]
    async fn test_validation_rejects_without_deploying() {
        let deployer = FlakyDeployer::failing_on("never");
        let manager = HotSwapManager::new(deployer.clone());
        assert!(!manager.swap("", release("1.0.0")).await);
        assert!(!manager.swap("c", ComponentRelease::new(" ", json!({}))).await);
        assert!(!manager.swap("c", ComponentRelease::new("1.0.0", serde_json::Value::Null)).await);

        assert!(manager.swap("c", release("1.0.0")).await);
        assert!(!manager.swap("c", release("1.0.0")).await);
        assert_eq!(manager.version_history("c").len(), 1);
        assert!(deployer.restored.lock().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_timeout_rolls_back() {
        let manager = HotSwapManager::new(Arc::new(HangingDeployer))
            .with_config(HotSwapConfig { deploy_timeout_ms: 20 });
        assert!(!manager.swap("slow", release("1.0.0")).await);
        assert!(manager.current_version("slow").is_none());
    }
}
