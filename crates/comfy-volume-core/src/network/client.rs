//! HTTP client wrapper.
//!
//! Thin layer over reqwest with a fixed user agent, a default timeout, and
//! error conversion into [`VolumeError`].

use crate::config::NetworkConfig;
use crate::{Result, VolumeError};
use reqwest::{header, Client, Response};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// HTTP client shared by downloads, health checks, and reload triggers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    default_timeout: Duration,
}

impl HttpClient {
    /// Create a client with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a client with a custom default timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::DOWNLOAD_CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| VolumeError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            default_timeout: timeout,
        })
    }

    /// Client for long-running transfers (large model files).
    pub fn for_downloads() -> Result<Self> {
        Self::with_timeout(NetworkConfig::DOWNLOAD_TIMEOUT)
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// GET with an optional bearer token.
    pub async fn get(&self, url: &str, bearer: Option<&str>) -> Result<Response> {
        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        request.send().await.map_err(|e| map_send_error(e, url, self.default_timeout))
    }

    /// GET with a per-request timeout.
    pub async fn get_with_timeout(&self, url: &str, timeout: Duration) -> Result<Response> {
        debug!("GET {} (timeout {:?})", url, timeout);
        self.client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_send_error(e, url, timeout))
    }

    /// POST a JSON body with a per-request timeout.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<Response> {
        debug!("POST {}", url);
        self.client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| map_send_error(e, url, timeout))
    }
}

fn map_send_error(err: reqwest::Error, url: &str, timeout: Duration) -> VolumeError {
    if err.is_timeout() {
        VolumeError::Timeout(timeout)
    } else {
        VolumeError::Network {
            message: format!("Request to {} failed: {}", url, err),
            cause: Some(err.to_string()),
        }
    }
}
