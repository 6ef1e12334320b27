//! Directory layout shared by the volume and the engine installation.
//!
//! ```text
//! <cache_root>/<category>/<filename>      -> <runtime_root>/models/<category>/<filename>
//! <cache_root>/custom_nodes/<name>        -> <runtime_root>/custom_nodes/<name>
//! <cache_root>/hf_cache/<owner>--<repo>/<revision>/<path>
//! ```

use crate::config::{PathsConfig, VolumeConfig};
use std::path::{Path, PathBuf};

/// Resolved paths for one cache volume and one engine installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeLayout {
    cache_root: PathBuf,
    runtime_root: PathBuf,
    categories: Vec<String>,
}

impl VolumeLayout {
    pub fn new(
        cache_root: impl Into<PathBuf>,
        runtime_root: impl Into<PathBuf>,
        categories: Vec<String>,
    ) -> Self {
        Self {
            cache_root: absolute_path(&cache_root.into()),
            runtime_root: absolute_path(&runtime_root.into()),
            categories,
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Self {
        Self::new(
            &config.cache_root,
            &config.runtime_root,
            config.categories.clone(),
        )
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn runtime_root(&self) -> &Path {
        &self.runtime_root
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn is_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }

    /// `<cache_root>/<category>`
    pub fn cache_category_dir(&self, category: &str) -> PathBuf {
        self.cache_root.join(category)
    }

    /// `<runtime_root>/models`
    pub fn runtime_models_dir(&self) -> PathBuf {
        self.runtime_root.join(PathsConfig::MODELS_DIR_NAME)
    }

    /// `<runtime_root>/models/<category>`
    pub fn runtime_category_dir(&self, category: &str) -> PathBuf {
        self.runtime_models_dir().join(category)
    }

    /// `<cache_root>/custom_nodes`
    pub fn cache_nodes_dir(&self) -> PathBuf {
        self.cache_root.join(PathsConfig::CUSTOM_NODES_DIR_NAME)
    }

    /// `<runtime_root>/custom_nodes`
    pub fn runtime_nodes_dir(&self) -> PathBuf {
        self.runtime_root.join(PathsConfig::CUSTOM_NODES_DIR_NAME)
    }

    /// `<cache_root>/hf_cache`
    pub fn hf_cache_dir(&self) -> PathBuf {
        self.cache_root.join(PathsConfig::HF_CACHE_DIR_NAME)
    }

    /// Blob location for a HuggingFace file.
    ///
    /// `filename` may contain repo subdirectories (`text_encoders/clip_l.safetensors`);
    /// they are preserved under the revision directory.
    pub fn hf_blob_path(&self, repo_id: &str, revision: &str, filename: &str) -> PathBuf {
        let mut path = self
            .hf_cache_dir()
            .join(repo_id.replace('/', "--"))
            .join(revision);
        for segment in filename.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }
}

/// Resolve `path` against the working directory without touching the filesystem.
///
/// Symlink targets are stored verbatim, so a relative cache path would resolve
/// from the link's own directory instead of the working directory.
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
