//! Custom node types and data structures.

use comfy_volume_core::metadata::NodeInstallInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What an install request ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAction {
    /// Fresh clone
    Installed,
    /// Existing checkout pulled in place
    Updated,
    /// Existing directory that is not a git checkout, left alone
    Skipped,
    /// Clone or pull exceeded its timeout
    Timeout,
    Failed,
}

/// Result of a custom node install request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallResult {
    pub success: bool,
    pub node_name: String,
    /// Directory on the cache volume
    pub node_path: PathBuf,
    pub action: NodeAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Best-effort steps that failed (dependency install, install script)
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_info: Option<NodeInstallInfo>,
}

impl InstallResult {
    pub(crate) fn new(node_name: &str, node_path: PathBuf, action: NodeAction) -> Self {
        Self {
            success: !matches!(action, NodeAction::Failed | NodeAction::Timeout),
            node_name: node_name.to_string(),
            node_path,
            action,
            error: None,
            warnings: Vec::new(),
            install_info: None,
        }
    }

    pub(crate) fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A custom node present on the cache volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstalledCustomNode {
    /// Directory name
    pub name: String,
    pub path: PathBuf,
    /// Has an `__init__.py`, so the engine can import it
    pub valid: bool,
    pub has_requirements: bool,
    pub is_git_repo: bool,
    /// A runtime entry with the same name exists
    pub linked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_info: Option<NodeInstallInfo>,
}

/// Result of removing a custom node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveResult {
    pub success: bool,
    pub node_name: String,
    pub removed_runtime_link: bool,
}

/// Import check for one runtime custom node entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVerification {
    pub name: String,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of installing one node's `requirements.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsOutcome {
    pub node_name: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
