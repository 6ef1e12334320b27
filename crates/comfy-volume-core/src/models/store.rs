//! Model store on the shared cache volume.
//!
//! URL downloads are stored in place at `<cache_root>/<category>/<name>`.
//! HuggingFace downloads land in `hf_cache` and are exposed in their category
//! through a symlink, so the same repo file requested for two categories is
//! fetched once.

use crate::config::VolumeConfig;
use crate::layout::VolumeLayout;
use crate::link::{create_symlink, is_hidden};
use crate::metadata::{atomic_read_json, atomic_write_json, model_info_path, ModelInfo, ModelSource};
use crate::models::types::{
    ModelAction, ModelActionResult, ModelEntry, ModelListing, RuntimeNodeEntry, RuntimeNodeKind,
};
use crate::network::{DownloadManager, HfFileRef};
use crate::{Result, VolumeError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use url::Url;
use walkdir::WalkDir;

/// Downloads, lists, and deletes cached models.
#[derive(Debug, Clone)]
pub struct ModelStore {
    layout: VolumeLayout,
    downloads: DownloadManager,
    hf_endpoint: String,
    hf_token: Option<String>,
}

impl ModelStore {
    pub fn new(layout: VolumeLayout, downloads: DownloadManager) -> Self {
        Self {
            layout,
            downloads,
            hf_endpoint: crate::config::NetworkConfig::HF_ENDPOINT.to_string(),
            hf_token: None,
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Result<Self> {
        Ok(Self::new(VolumeLayout::from_config(config), DownloadManager::new()?)
            .with_hf_endpoint(&config.hf_endpoint)
            .with_hf_token(config.hf_token.clone()))
    }

    pub fn with_hf_endpoint(mut self, endpoint: &str) -> Self {
        self.hf_endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_hf_token(mut self, token: Option<String>) -> Self {
        self.hf_token = token;
        self
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// List non-hidden entries of every recognized category present in the cache.
    pub fn list_models(&self) -> ModelListing {
        let mut listing = ModelListing::default();

        for category in self.layout.categories() {
            let dir = self.layout.cache_category_dir(category);
            if !dir.is_dir() {
                continue;
            }

            let mut entries = Vec::new();
            for entry in WalkDir::new(&dir)
                .min_depth(1)
                .max_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if is_hidden(&name) {
                    continue;
                }

                let info: Option<ModelInfo> =
                    atomic_read_json(&model_info_path(&dir, &name)).unwrap_or_else(|e| {
                        debug!("Ignoring unreadable sidecar for {}: {}", name, e);
                        None
                    });

                entries.push(ModelEntry {
                    size_bytes: file_size(entry.path()),
                    is_symlink: entry.path_is_symlink(),
                    source: info.as_ref().map(|i| i.source),
                    origin: info.and_then(|i| i.repo_id.or(i.url)),
                    name,
                });
            }

            listing.total += entries.len();
            listing.models.insert(category.clone(), entries);
        }

        listing
    }

    /// Download one file from a HuggingFace repo into `category`.
    ///
    /// Invalid input is an `Err`; transfer failures are a `Failed` result.
    pub async fn download_from_hf(
        &self,
        repo_id: &str,
        filename: &str,
        category: &str,
        revision: Option<&str>,
    ) -> Result<ModelActionResult> {
        self.require_category(category)?;
        let file = HfFileRef::new(repo_id, filename, revision)?;
        let local_name = file.local_name().to_string();
        validate_local_name(&local_name)?;

        let category_dir = self.layout.cache_category_dir(category);
        let dest = category_dir.join(&local_name);
        if fs::symlink_metadata(&dest).is_ok() {
            info!("{}/{} already cached", category, local_name);
            return Ok(ModelActionResult::ok(
                ModelAction::Exists,
                &local_name,
                category,
                file_size(&dest),
            )
            .at(dest));
        }

        let blob = self
            .layout
            .hf_blob_path(&file.repo_id, &file.revision, &file.filename);
        let size = if blob.is_file() {
            debug!("Reusing blob {}", blob.display());
            file_size(&blob)
        } else {
            let url = file.resolve_url(&self.hf_endpoint);
            info!("Downloading {} from {}", local_name, url);
            match self
                .downloads
                .download(&url, &blob, self.hf_token.as_deref())
                .await
            {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("Download of {} failed: {}", url, e);
                    return Ok(ModelActionResult::failed(&local_name, category, e));
                }
            }
        };

        let linked = fs::create_dir_all(&category_dir).and_then(|_| create_symlink(&blob, &dest));
        match linked {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Ok(ModelActionResult::ok(
                    ModelAction::Exists,
                    &local_name,
                    category,
                    file_size(&dest),
                )
                .at(dest));
            }
            Err(e) => {
                return Ok(ModelActionResult::failed(
                    &local_name,
                    category,
                    format!("Failed to link {} into {}: {}", blob.display(), category, e),
                ));
            }
        }

        self.write_info(
            &category_dir,
            ModelInfo {
                filename: local_name.clone(),
                model_type: category.to_string(),
                source: ModelSource::Huggingface,
                repo_id: Some(file.repo_id.clone()),
                revision: Some(file.revision.clone()),
                url: None,
                size_bytes: size.unwrap_or(0),
                downloaded_at: chrono::Utc::now().to_rfc3339(),
            },
        );

        Ok(ModelActionResult::ok(ModelAction::Downloaded, &local_name, category, size).at(dest))
    }

    /// Download a file from an arbitrary http(s) URL into `category`.
    ///
    /// When `filename` is `None` the last URL path segment is used.
    pub async fn download_from_url(
        &self,
        url: &str,
        filename: Option<&str>,
        category: &str,
    ) -> Result<ModelActionResult> {
        self.require_category(category)?;
        let parsed = Url::parse(url.trim())
            .map_err(|e| VolumeError::validation("url", format!("invalid URL '{}': {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VolumeError::validation(
                "url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }

        let local_name = match filename.map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => name.to_string(),
            None => name_from_url(&parsed)?,
        };
        validate_local_name(&local_name)?;

        let category_dir = self.layout.cache_category_dir(category);
        let dest = category_dir.join(&local_name);
        if fs::symlink_metadata(&dest).is_ok() {
            info!("{}/{} already cached", category, local_name);
            return Ok(ModelActionResult::ok(
                ModelAction::Exists,
                &local_name,
                category,
                file_size(&dest),
            )
            .at(dest));
        }

        info!("Downloading {} from {}", local_name, parsed);
        let bytes = match self.downloads.download(parsed.as_str(), &dest, None).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Download of {} failed: {}", parsed, e);
                return Ok(ModelActionResult::failed(&local_name, category, e));
            }
        };

        self.write_info(
            &category_dir,
            ModelInfo {
                filename: local_name.clone(),
                model_type: category.to_string(),
                source: ModelSource::Url,
                repo_id: None,
                revision: None,
                url: Some(parsed.to_string()),
                size_bytes: bytes,
                downloaded_at: chrono::Utc::now().to_rfc3339(),
            },
        );

        Ok(ModelActionResult::ok(ModelAction::Downloaded, &local_name, category, Some(bytes)).at(dest))
    }

    /// Copy a local file into `category`, keeping its name unless `filename` is given.
    ///
    /// The copy goes through a hidden temp file so the linker never sees a partial
    /// model; the temp file is removed when the copy fails.
    pub fn import_local(
        &self,
        source: &Path,
        category: &str,
        filename: Option<&str>,
    ) -> Result<ModelActionResult> {
        self.require_category(category)?;
        let meta = match fs::metadata(source) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VolumeError::FileNotFound(source.to_path_buf()))
            }
            Err(e) => return Err(VolumeError::io_with_path(e, source)),
        };
        if !meta.is_file() {
            return Err(VolumeError::validation(
                "path",
                format!("{} is not a regular file", source.display()),
            ));
        }

        let local_name = match filename.map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => name.to_string(),
            None => source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        validate_local_name(&local_name)?;

        let category_dir = self.layout.cache_category_dir(category);
        let dest = category_dir.join(&local_name);
        if fs::symlink_metadata(&dest).is_ok() {
            info!("{}/{} already cached", category, local_name);
            return Ok(ModelActionResult::ok(
                ModelAction::Exists,
                &local_name,
                category,
                file_size(&dest),
            )
            .at(dest));
        }

        let temp = self.downloads.temp_path_for(&dest);
        let copied = fs::create_dir_all(&category_dir)
            .and_then(|_| fs::copy(source, &temp))
            .and_then(|bytes| fs::rename(&temp, &dest).map(|_| bytes));
        let bytes = match copied {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Import of {} failed: {}", source.display(), e);
                let _ = fs::remove_file(&temp);
                return Ok(ModelActionResult::failed(&local_name, category, e));
            }
        };

        self.write_info(
            &category_dir,
            ModelInfo {
                filename: local_name.clone(),
                model_type: category.to_string(),
                source: ModelSource::Local,
                repo_id: None,
                revision: None,
                url: None,
                size_bytes: bytes,
                downloaded_at: chrono::Utc::now().to_rfc3339(),
            },
        );

        info!("Imported {} as {}/{}", source.display(), category, local_name);
        Ok(ModelActionResult::ok(ModelAction::Imported, &local_name, category, Some(bytes)).at(dest))
    }

    /// Delete a cached model, its sidecar, runtime symlinks pointing at it, and
    /// its HuggingFace blob once nothing else links to the blob.
    pub fn delete_model(&self, category: &str, filename: &str) -> Result<ModelActionResult> {
        self.require_category(category)?;
        validate_local_name(filename)?;

        let category_dir = self.layout.cache_category_dir(category);
        let path = category_dir.join(filename);
        let meta = match fs::symlink_metadata(&path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(VolumeError::ModelNotFound {
                    category: category.to_string(),
                    filename: filename.to_string(),
                })
            }
            Err(e) => return Err(VolumeError::io_with_path(e, &path)),
        };

        let size = file_size(&path);
        let blob = if meta.file_type().is_symlink() {
            fs::read_link(&path).ok().map(|t| absolutize(&category_dir, t))
        } else {
            None
        };

        let removed_links = self.remove_runtime_links(category, &path);

        if meta.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
        .map_err(|e| VolumeError::io_with_path(e, &path))?;

        if let Err(e) = fs::remove_file(model_info_path(&category_dir, filename)) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove sidecar for {}: {}", filename, e);
            }
        }

        if let Some(blob) = blob {
            self.remove_orphan_blob(&blob);
        }

        info!(
            "Deleted {}/{} ({} runtime links removed)",
            category, filename, removed_links
        );
        Ok(ModelActionResult::ok(ModelAction::Deleted, filename, category, size).at(path))
    }

    /// Entries under the runtime custom node directory.
    pub fn runtime_node_entries(&self) -> Vec<RuntimeNodeEntry> {
        let dir = self.layout.runtime_nodes_dir();
        if !dir.is_dir() {
            return Vec::new();
        }

        WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !is_hidden(&e.file_name().to_string_lossy()))
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                if e.path_is_symlink() {
                    RuntimeNodeEntry {
                        name,
                        kind: RuntimeNodeKind::Symlink,
                        target: fs::read_link(e.path()).ok(),
                    }
                } else {
                    RuntimeNodeEntry {
                        name,
                        kind: RuntimeNodeKind::Builtin,
                        target: None,
                    }
                }
            })
            .collect()
    }

    fn require_category(&self, category: &str) -> Result<()> {
        if self.layout.is_category(category) {
            Ok(())
        } else {
            Err(VolumeError::UnsupportedCategory {
                category: category.to_string(),
                supported: self.layout.categories().join(", "),
            })
        }
    }

    fn write_info(&self, category_dir: &Path, info: ModelInfo) {
        let path = model_info_path(category_dir, &info.filename);
        if let Err(e) = atomic_write_json(&path, &info) {
            warn!("Failed to write provenance {}: {}", path.display(), e);
        }
    }

    fn remove_runtime_links(&self, category: &str, cached: &Path) -> usize {
        let runtime_dir = self.layout.runtime_category_dir(category);
        symlinks_in(&runtime_dir)
            .filter(|(_, target)| target == cached)
            .filter(|(link, _)| match fs::remove_file(link) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to remove runtime link {}: {}", link.display(), e);
                    false
                }
            })
            .count()
    }

    fn remove_orphan_blob(&self, blob: &Path) {
        let hf_cache = self.layout.hf_cache_dir();
        if !blob.starts_with(&hf_cache) {
            return;
        }

        let in_use = self.layout.categories().iter().any(|category| {
            let dir = self.layout.cache_category_dir(category);
            symlinks_in(&dir).any(|(_, target)| absolutize(&dir, target) == blob)
        });
        if in_use {
            debug!("Blob {} still linked, keeping it", blob.display());
            return;
        }

        match fs::remove_file(blob) {
            Ok(()) => debug!("Removed blob {}", blob.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove blob {}: {}", blob.display(), e);
                return;
            }
        }

        let mut dir = blob.parent();
        while let Some(current) = dir {
            if current == hf_cache || !current.starts_with(&hf_cache) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

/// `(link_path, link_target)` for every symlink directly inside `dir`.
fn symlinks_in(dir: &Path) -> impl Iterator<Item = (PathBuf, PathBuf)> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path_is_symlink())
        .filter_map(|e| {
            let target = fs::read_link(e.path()).ok()?;
            Some((e.into_path(), target))
        })
}

fn absolutize(base: &Path, target: PathBuf) -> PathBuf {
    if target.is_absolute() {
        target
    } else {
        base.join(target)
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).ok().filter(|m| m.is_file()).map(|m| m.len())
}

fn name_from_url(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .and_then(|s| urlencoding::decode(s).ok())
        .map(|s| s.into_owned())
        .ok_or_else(|| {
            VolumeError::validation("filename", format!("cannot derive a filename from {}", url))
        })
}

/// A cache entry name: one path component, not hidden.
fn validate_local_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(VolumeError::validation("filename", "must not be empty"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(VolumeError::validation(
            "filename",
            format!("must not contain path separators: '{}'", name),
        ));
    }
    if is_hidden(name) {
        return Err(VolumeError::validation(
            "filename",
            format!("hidden names are reserved: '{}'", name),
        ));
    }
    Ok(())
}
