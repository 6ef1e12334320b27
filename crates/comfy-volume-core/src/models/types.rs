//! Model store result types.

use crate::metadata::ModelSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One entry in a category directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    /// Size of the file the entry resolves to; `None` when unreadable
    pub size_bytes: Option<u64>,
    pub is_symlink: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ModelSource>,
    /// Repo id or URL recorded at download time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Cached models grouped by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelListing {
    pub models: BTreeMap<String, Vec<ModelEntry>>,
    pub total: usize,
}

/// What a store operation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelAction {
    Downloaded,
    Imported,
    Exists,
    Deleted,
    Failed,
}

/// Outcome of a download or delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelActionResult {
    pub success: bool,
    pub action: ModelAction,
    pub filename: String,
    pub model_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelActionResult {
    pub(crate) fn ok(
        action: ModelAction,
        filename: &str,
        model_type: &str,
        size_bytes: Option<u64>,
    ) -> Self {
        Self {
            success: true,
            action,
            filename: filename.to_string(),
            model_type: model_type.to_string(),
            path: None,
            size_bytes,
            error: None,
        }
    }

    pub(crate) fn at(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub(crate) fn failed(filename: &str, model_type: &str, error: impl ToString) -> Self {
        Self {
            success: false,
            action: ModelAction::Failed,
            filename: filename.to_string(),
            model_type: model_type.to_string(),
            path: None,
            size_bytes: None,
            error: Some(error.to_string()),
        }
    }
}

/// How a runtime custom node entry got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeNodeKind {
    Symlink,
    Builtin,
}

/// One entry under `<runtime_root>/custom_nodes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeNodeEntry {
    pub name: String,
    pub kind: RuntimeNodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
}
