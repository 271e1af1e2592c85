//! HTTP backend: speaks JSON-RPC 2.0 over POST to a remote endpoint.

use crate::backend::Backend;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, EXECUTE_METHOD, PING_METHOD};
use crate::types::GroupTask;
use async_trait::async_trait;
use smarts_core::{ExecutionContext, SmartsError, SmartsResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Backend reached over HTTP.
pub struct HttpBackend {
    endpoint: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpBackend {
    /// Client for `endpoint` with the default request timeout.
    pub fn new(endpoint: impl Into<String>) -> SmartsResult<Self> {
        Self::with_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Client for `endpoint` with a custom request timeout.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> SmartsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmartsError::Http(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    /// URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> SmartsResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);
        debug!(endpoint = %self.endpoint, method = %method, id, "Sending backend request");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SmartsError::Http(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SmartsError::Http(format!(
                "{} returned {status}",
                self.endpoint
            )));
        }

        let body: JsonRpcResponse = response.json().await.map_err(|e| {
            SmartsError::Http(format!("invalid response from {}: {e}", self.endpoint))
        })?;

        if let Some(err) = body.error {
            return Err(SmartsError::Execution(format!(
                "backend error {}: {}",
                err.code, err.message
            )));
        }
        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn execute(
        &self,
        task: &GroupTask,
        ctx: &ExecutionContext,
    ) -> SmartsResult<serde_json::Value> {
        let params = serde_json::json!({
            "task_id": ctx.task_id,
            "task": task,
        });
        self.request(EXECUTE_METHOD, Some(params)).await
    }

    async fn health_check(&self) -> SmartsResult<()> {
        self.request(PING_METHOD, None).await.map(|_| ())
    }
}
