//! Upstream engine health check.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{Result, VolumeError};
use std::time::Duration;
use tracing::debug;

/// Checks the inference engine's stats endpoint.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    http: HttpClient,
    url: String,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(http: HttpClient, upstream_url: &str) -> Self {
        Self {
            http,
            url: health_check_url(upstream_url),
            timeout: NetworkConfig::HEALTH_CHECK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Succeeds when the engine answers with a 2xx status within the timeout.
    pub async fn check(&self) -> Result<()> {
        let response = self
            .http
            .get_with_timeout(&self.url, self.timeout)
            .await
            .map_err(|e| VolumeError::UpstreamUnhealthy {
                url: self.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            debug!("Upstream healthy at {}", self.url);
            Ok(())
        } else {
            Err(VolumeError::UpstreamUnhealthy {
                url: self.url.clone(),
                message: format!("status {}", status),
            })
        }
    }
}

/// Health endpoint for an upstream base URL.
pub fn health_check_url(upstream_url: &str) -> String {
    format!(
        "{}{}",
        upstream_url.trim_end_matches('/'),
        NetworkConfig::HEALTH_CHECK_PATH
    )
}
