//! Client for the inference engine's own HTTP API.

use comfy_volume_core::config::NetworkConfig;
use comfy_volume_core::network::{HealthChecker, HttpClient};
use comfy_volume_core::{Result, VolumeError};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

/// Forwards requests to the engine and checks its health.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    base_url: String,
    http: HttpClient,
    health: HealthChecker,
}

impl UpstreamClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = HttpClient::with_timeout(NetworkConfig::INFERENCE_TIMEOUT)?;
        let health = HealthChecker::new(HttpClient::new()?, &base_url);
        Ok(Self {
            base_url,
            http,
            health,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `GET /system_stats` with the health check timeout.
    pub async fn check_health(&self) -> Result<()> {
        self.health.check().await
    }

    /// Queue a prepared workflow under `client_id`.
    pub async fn submit_prompt(&self, workflow: Value, client_id: &str) -> Result<Value> {
        let url = format!("{}/prompt", self.base_url);
        let response = self
            .http
            .post_json(
                &url,
                &json!({"prompt": workflow, "client_id": client_id}),
                NetworkConfig::INFERENCE_TIMEOUT,
            )
            .await?;

        let status = response.status();
        let body = read_body(response).await;
        if !status.is_success() {
            return Err(VolumeError::Network {
                message: format!("Upstream rejected prompt with status {}: {}", status, body),
                cause: None,
            });
        }
        Ok(body)
    }

    /// Forward a request to `<upstream>/<path>` and return its status and body.
    pub async fn forward(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<Value>,
    ) -> Result<(StatusCode, Value)> {
        let mut url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        debug!("Forwarding {} {}", method, url);

        let mut request = self.http.inner().request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                VolumeError::Timeout(NetworkConfig::INFERENCE_TIMEOUT)
            } else {
                VolumeError::Network {
                    message: format!("Request to {} failed: {}", url, e),
                    cause: Some(e.to_string()),
                }
            }
        })?;

        let status = response.status();
        Ok((status, read_body(response).await))
    }
}

/// JSON body when it parses, otherwise the raw text as a string.
async fn read_body(response: reqwest::Response) -> Value {
    match response.text().await {
        Ok(text) if text.is_empty() => Value::Null,
        Ok(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        Err(e) => Value::String(format!("<unreadable body: {}>", e)),
    }
}
