//! Provenance records stored next to cached assets.

use crate::config::PathsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where a cached model came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    Huggingface,
    Url,
    /// Copied from a local file
    Local,
}

/// Sidecar written as `.<filename>.info.json` in the category directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub filename: String,
    pub model_type: String,
    pub source: ModelSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    /// RFC 3339 timestamp
    pub downloaded_at: String,
}

/// Sidecar written as `.install_info.json` inside a custom node directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstallInfo {
    pub node_name: String,
    pub repo_url: String,
    pub branch: String,
    /// RFC 3339 timestamp of the first install
    pub installed_at: String,
    /// RFC 3339 timestamp of the last in-place update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub has_requirements: bool,
    #[serde(default)]
    pub has_install_script: bool,
    #[serde(default)]
    pub installed_packages: Vec<String>,
}

impl NodeInstallInfo {
    /// Path of the sidecar inside `node_dir`.
    pub fn path_in(node_dir: &Path) -> PathBuf {
        node_dir.join(PathsConfig::NODE_INFO_FILENAME)
    }
}

/// Path of the sidecar for `filename` inside `category_dir`.
pub fn model_info_path(category_dir: &Path, filename: &str) -> PathBuf {
    category_dir.join(format!(".{}{}", filename, PathsConfig::MODEL_INFO_SUFFIX))
}
