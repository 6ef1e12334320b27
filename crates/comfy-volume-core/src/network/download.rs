//! Streaming file downloads.
//!
//! Bytes are streamed into a hidden `.<name>.part` file beside the
//! destination and renamed into place once the body is complete. A failed
//! transfer removes its partial file, so the destination either holds a full
//! asset or nothing.

use crate::config::NetworkConfig;
use crate::network::client::HttpClient;
use crate::{Result, VolumeError};
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Log a progress line every this many bytes.
const PROGRESS_LOG_INTERVAL: u64 = 256 * 1024 * 1024;

/// Download manager for model files.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    http: Arc<HttpClient>,
    temp_suffix: String,
}

impl DownloadManager {
    /// Create a download manager with a long-timeout client.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(Arc::new(HttpClient::for_downloads()?)))
    }

    /// Create a download manager with a custom HTTP client.
    pub fn with_client(http: Arc<HttpClient>) -> Self {
        Self {
            http,
            temp_suffix: NetworkConfig::DOWNLOAD_TEMP_SUFFIX.to_string(),
        }
    }

    /// Download `url` to `destination`.
    ///
    /// # Returns
    ///
    /// Total bytes written on success
    pub async fn download(&self, url: &str, destination: &Path, bearer: Option<&str>) -> Result<u64> {
        if let Some(parent) = destination.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| VolumeError::Io {
                    message: format!("Failed to create directory: {}", e),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let temp_path = self.temp_path_for(destination);

        match self.do_download(url, &temp_path, bearer).await {
            Ok(bytes) => {
                std::fs::rename(&temp_path, destination).map_err(|e| {
                    let _ = std::fs::remove_file(&temp_path);
                    VolumeError::Io {
                        message: format!("Failed to move download to final destination: {}", e),
                        path: Some(destination.to_path_buf()),
                        source: Some(e),
                    }
                })?;

                info!("Downloaded {} bytes to {}", bytes, destination.display());
                Ok(bytes)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&temp_path);
                Err(e)
            }
        }
    }

    /// Hidden temp path next to `destination`.
    pub fn temp_path_for(&self, destination: &Path) -> PathBuf {
        let name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        destination.with_file_name(format!(".{}{}", name, self.temp_suffix))
    }

    async fn do_download(&self, url: &str, temp_path: &Path, bearer: Option<&str>) -> Result<u64> {
        let response = self.http.get(url, bearer).await?;
        let status = response.status();

        if !status.is_success() {
            return Err(VolumeError::DownloadFailed {
                url: url.to_string(),
                message: format!("Download failed with status {}", status),
            });
        }

        let total_bytes = response.content_length();
        let mut file = std::fs::File::create(temp_path).map_err(|e| VolumeError::Io {
            message: format!("Failed to create temp file: {}", e),
            path: Some(temp_path.to_path_buf()),
            source: Some(e),
        })?;

        let mut bytes_downloaded: u64 = 0;
        let mut next_log = PROGRESS_LOG_INTERVAL;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| VolumeError::DownloadFailed {
                url: url.to_string(),
                message: format!("Error reading download stream: {}", e),
            })?;

            file.write_all(&chunk).map_err(|e| VolumeError::Io {
                message: format!("Failed to write to temp file: {}", e),
                path: Some(temp_path.to_path_buf()),
                source: Some(e),
            })?;

            bytes_downloaded += chunk.len() as u64;
            if bytes_downloaded >= next_log {
                debug!(
                    "{}: {} / {} bytes",
                    url,
                    bytes_downloaded,
                    total_bytes.map_or_else(|| "?".to_string(), |t| t.to_string())
                );
                next_log += PROGRESS_LOG_INTERVAL;
            }
        }

        if let Some(expected) = total_bytes {
            if bytes_downloaded != expected {
                return Err(VolumeError::DownloadFailed {
                    url: url.to_string(),
                    message: format!(
                        "Truncated body: received {} of {} bytes",
                        bytes_downloaded, expected
                    ),
                });
            }
        }

        file.flush()
            .and_then(|_| file.sync_all())
            .map_err(|e| VolumeError::Io {
                message: format!("Failed to flush temp file: {}", e),
                path: Some(temp_path.to_path_buf()),
                source: Some(e),
            })?;

        Ok(bytes_downloaded)
    }
}
