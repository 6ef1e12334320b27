//! HuggingFace file references.
//!
//! Resolves `(repo_id, revision, path)` triples to download URLs on the Hub
//! `resolve` endpoint.

use crate::config::NetworkConfig;
use crate::{Result, VolumeError};
use regex::Regex;
use std::sync::LazyLock;

static REPO_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*/[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap()
});

/// A single file inside a HuggingFace repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HfFileRef {
    pub repo_id: String,
    /// Path inside the repo, may contain `/`
    pub filename: String,
    pub revision: String,
}

impl HfFileRef {
    /// Validate and build a file reference. `revision` defaults to `main`.
    pub fn new(repo_id: &str, filename: &str, revision: Option<&str>) -> Result<Self> {
        let repo_id = repo_id.trim();
        if !REPO_ID.is_match(repo_id) {
            return Err(VolumeError::validation(
                "repo_id",
                format!("expected <owner>/<name>, got '{}'", repo_id),
            ));
        }

        let filename = filename.trim().trim_start_matches('/');
        if filename.is_empty() {
            return Err(VolumeError::validation("filename", "must not be empty"));
        }
        if filename.split('/').any(|s| s == ".." || s == ".") {
            return Err(VolumeError::validation(
                "filename",
                format!("relative path segments are not allowed: '{}'", filename),
            ));
        }

        let revision = match revision.map(str::trim) {
            None => NetworkConfig::HF_DEFAULT_REVISION,
            Some(revision) => validate_revision(revision)?,
        };

        Ok(Self {
            repo_id: repo_id.to_string(),
            filename: filename.to_string(),
            revision: revision.to_string(),
        })
    }

    /// Final path component; this is the name the asset gets in its category.
    pub fn local_name(&self) -> &str {
        self.filename.rsplit('/').next().unwrap_or(&self.filename)
    }

    /// `<endpoint>/<repo_id>/resolve/<revision>/<filename>`
    pub fn resolve_url(&self, endpoint: &str) -> String {
        let path = self
            .filename
            .split('/')
            .map(|s| urlencoding::encode(s).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/resolve/{}/{}",
            endpoint.trim_end_matches('/'),
            self.repo_id,
            urlencoding::encode(&self.revision),
            path
        )
    }
}

/// Revisions become a directory under the blob cache, so they must stay relative
/// and free of `.`/`..` segments. Branch names such as `refs/pr/1` are allowed.
fn validate_revision(revision: &str) -> Result<&str> {
    let invalid = revision.is_empty()
        || revision.starts_with('/')
        || revision.contains('\\')
        || revision
            .split('/')
            .any(|s| s.is_empty() || s == "." || s == "..");
    if invalid {
        return Err(VolumeError::validation(
            "revision",
            format!("not a valid revision: '{}'", revision),
        ));
    }
    Ok(revision)
}
