//! Error types for comfy-volume.
//!
//! Per-entry failures (one link, one download, one node) are reported through
//! result structs; this enum covers failures that abort a whole operation.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the comfy-volume crates.
#[derive(Debug, Error)]
pub enum VolumeError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Upstream {url} is not healthy: {message}")]
    UpstreamUnhealthy { url: String, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Model store errors
    #[error("Unsupported model type: {category} (supported: {supported})")]
    UnsupportedCategory { category: String, supported: String },

    #[error("Model not found: {category}/{filename}")]
    ModelNotFound { category: String, filename: String },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    // Custom node errors
    #[error("Custom node not found: {name}")]
    NodeNotFound { name: String },

    #[error("Command `{command}` failed: {message}")]
    CommandFailed { command: String, message: String },

    // Workflow errors
    #[error("Workflow template not found: {0}")]
    WorkflowMissing(PathBuf),

    #[error("Invalid workflow template: {message}")]
    InvalidWorkflow { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for comfy-volume operations.
pub type Result<T> = std::result::Result<T, VolumeError>;

impl From<std::io::Error> for VolumeError {
    fn from(err: std::io::Error) -> Self {
        VolumeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for VolumeError {
    fn from(err: serde_json::Error) -> Self {
        VolumeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for VolumeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VolumeError::Timeout(std::time::Duration::from_secs(0))
        } else {
            VolumeError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl VolumeError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        VolumeError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        VolumeError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status code the server uses when this error ends a request.
    pub fn http_status(&self) -> u16 {
        match self {
            VolumeError::Validation { .. }
            | VolumeError::UnsupportedCategory { .. }
            | VolumeError::InvalidWorkflow { .. } => 400,

            VolumeError::FileNotFound(_)
            | VolumeError::ModelNotFound { .. }
            | VolumeError::NodeNotFound { .. }
            | VolumeError::WorkflowMissing(_) => 404,

            VolumeError::Network { .. } | VolumeError::DownloadFailed { .. } => 502,

            VolumeError::UpstreamUnhealthy { .. } => 503,

            VolumeError::Timeout(_) => 504,

            _ => 500,
        }
    }
}
