//! Client side of the hot reload endpoint.
//!
//! Used by the CLI to tell a running server to relink after a download.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{Result, VolumeError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Body returned by `POST /reload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadSummary {
    pub success: bool,
    #[serde(default)]
    pub linked_count: usize,
    #[serde(default)]
    pub message: String,
}

/// POST to `reload_url` and parse the summary.
pub async fn trigger_reload(http: &HttpClient, reload_url: &str) -> Result<ReloadSummary> {
    let parsed = url::Url::parse(reload_url).map_err(|e| {
        VolumeError::validation("reload_url", format!("invalid URL '{}': {}", reload_url, e))
    })?;

    let response = http
        .post_json(
            parsed.as_str(),
            &serde_json::json!({}),
            NetworkConfig::RELOAD_TRIGGER_TIMEOUT,
        )
        .await?;

    let status = response.status();
    if !status.is_success() {
        warn!("Reload at {} returned status {}", reload_url, status);
        return Err(VolumeError::Network {
            message: format!("Reload failed with status {}", status),
            cause: None,
        });
    }

    let summary: ReloadSummary = response.json().await.map_err(|e| VolumeError::Network {
        message: format!("Invalid reload response: {}", e),
        cause: None,
    })?;
    info!(
        "Reload at {}: {} new links",
        reload_url, summary.linked_count
    );
    Ok(summary)
}
