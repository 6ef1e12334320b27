//! Custom node management on the shared cache volume.

use crate::types::{
    InstallResult, InstalledCustomNode, NodeAction, NodeVerification, RemoveResult,
    RequirementsOutcome,
};
use comfy_volume_core::config::{ProcessConfig, VolumeConfig};
use comfy_volume_core::metadata::{atomic_read_json, atomic_write_json, NodeInstallInfo};
use comfy_volume_core::process::{run_command, CommandSpec};
use comfy_volume_core::{Result, VolumeError, VolumeLayout};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

const DEFAULT_BRANCH: &str = "main";
const REQUIREMENTS_FILE: &str = "requirements.txt";
const INSTALL_SCRIPT: &str = "install.py";
const PACKAGE_MARKER: &str = "__init__.py";

/// Manager for custom nodes cached on the volume.
#[derive(Debug, Clone)]
pub struct CustomNodesManager {
    /// `<cache_root>/custom_nodes`
    cache_nodes_dir: PathBuf,
    /// `<runtime_root>/custom_nodes`
    runtime_nodes_dir: PathBuf,
    git_program: String,
    pip_program: String,
    python_program: String,
    clone_timeout: Duration,
    pull_timeout: Duration,
}

impl CustomNodesManager {
    /// Create a manager for the node directories of `layout`.
    pub fn new(layout: &VolumeLayout) -> Self {
        Self {
            cache_nodes_dir: layout.cache_nodes_dir(),
            runtime_nodes_dir: layout.runtime_nodes_dir(),
            git_program: "git".to_string(),
            pip_program: "pip".to_string(),
            python_program: "python".to_string(),
            clone_timeout: ProcessConfig::GIT_CLONE_TIMEOUT,
            pull_timeout: ProcessConfig::GIT_PULL_TIMEOUT,
        }
    }

    pub fn from_config(config: &VolumeConfig) -> Self {
        Self::new(&VolumeLayout::from_config(config)).with_programs(
            &config.git_program,
            &config.pip_program,
            &config.python_program,
        )
    }

    /// Override the `git`, `pip`, and `python` executables.
    pub fn with_programs(mut self, git: &str, pip: &str, python: &str) -> Self {
        self.git_program = git.to_string();
        self.pip_program = pip.to_string();
        self.python_program = python.to_string();
        self
    }

    /// Override the clone and pull timeouts.
    pub fn with_git_timeouts(mut self, clone: Duration, pull: Duration) -> Self {
        self.clone_timeout = clone;
        self.pull_timeout = pull;
        self
    }

    pub fn cache_nodes_dir(&self) -> &Path {
        &self.cache_nodes_dir
    }

    /// Path of a node on the cache volume.
    pub fn node_path(&self, node_name: &str) -> PathBuf {
        self.cache_nodes_dir.join(node_name)
    }

    pub fn node_exists(&self, node_name: &str) -> bool {
        validate_node_name(node_name).is_ok() && self.node_path(node_name).is_dir()
    }

    /// Install a custom node from a git URL into the cache volume.
    ///
    /// An existing git checkout is updated in place with `git pull --ff-only`
    /// and stays on the branch it was cloned from; an existing directory that
    /// is not a checkout is skipped. Dependency install and `install.py` are
    /// best effort and reported as warnings.
    pub async fn install(&self, repo_url: &str, branch: Option<&str>) -> Result<InstallResult> {
        let repo_url = repo_url.trim();
        if repo_url.is_empty() {
            return Err(VolumeError::validation("repo_url", "must not be empty"));
        }
        let node_name = extract_node_name_from_url(repo_url);
        validate_node_name(&node_name)?;
        let branch = branch
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or(DEFAULT_BRANCH);

        let node_path = self.node_path(&node_name);
        if node_path.exists() {
            return self.update_existing(&node_name, Some((repo_url, branch))).await;
        }

        if let Some(failed) = self.clone_repo(&node_name, &node_path, repo_url, branch).await? {
            return Ok(failed);
        }
        Ok(self
            .finish(&node_name, repo_url, branch, NodeAction::Installed, Vec::new())
            .await)
    }

    /// Pull an installed node by name and reinstall its requirements.
    pub async fn update(&self, node_name: &str) -> Result<InstallResult> {
        validate_node_name(node_name)?;
        if !self.node_exists(node_name) {
            warn!("Custom node not found: {}", node_name);
            return Err(VolumeError::NodeNotFound {
                name: node_name.to_string(),
            });
        }
        self.update_existing(node_name, None).await
    }

    /// Shared path of re-install and update. `requested` carries the URL and
    /// branch of an install request.
    async fn update_existing(
        &self,
        node_name: &str,
        requested: Option<(&str, &str)>,
    ) -> Result<InstallResult> {
        let node_path = self.node_path(node_name);
        let previous: Option<NodeInstallInfo> =
            atomic_read_json(&NodeInstallInfo::path_in(&node_path)).unwrap_or_default();

        if !node_path.join(".git").exists() {
            info!("{} exists and is not a git checkout, skipping", node_name);
            let mut result = InstallResult::new(node_name, node_path, NodeAction::Skipped);
            result
                .warnings
                .push("Existing directory is not a git checkout; left unchanged".to_string());
            result.install_info = previous;
            return Ok(result);
        }

        if let Some(failed) = self.pull(node_name, &node_path).await {
            return Ok(failed);
        }

        let mut warnings = Vec::new();
        let checked_out = previous.as_ref().map(|p| p.branch.as_str());
        let branch = match (checked_out, requested) {
            (Some(current), Some((_, wanted))) if current != wanted => {
                warnings.push(format!(
                    "Requested branch '{}' ignored; checkout stays on '{}'",
                    wanted, current
                ));
                current
            }
            (Some(current), _) => current,
            (None, Some((_, wanted))) => wanted,
            (None, None) => DEFAULT_BRANCH,
        }
        .to_string();
        let repo_url = requested
            .map(|(url, _)| url.to_string())
            .or_else(|| previous.as_ref().map(|p| p.repo_url.clone()))
            .unwrap_or_default();

        Ok(self
            .finish(node_name, &repo_url, &branch, NodeAction::Updated, warnings)
            .await)
    }

    /// Best-effort dependency steps and the install sidecar, after a
    /// successful clone or pull.
    async fn finish(
        &self,
        node_name: &str,
        repo_url: &str,
        branch: &str,
        action: NodeAction,
        warnings: Vec<String>,
    ) -> InstallResult {
        let node_path = self.node_path(node_name);
        let mut result = InstallResult::new(node_name, node_path.clone(), action);
        result.warnings = warnings;

        let has_requirements = node_path.join(REQUIREMENTS_FILE).is_file();
        let mut installed_packages = Vec::new();
        if has_requirements {
            match self.install_requirements(&node_path).await {
                Ok(()) => installed_packages = read_requirements(&node_path),
                Err(e) => {
                    warn!("Dependency install for {} failed: {}", node_name, e);
                    result.warnings.push(format!("Dependency install failed: {}", e));
                }
            }
        }

        let has_install_script = node_path.join(INSTALL_SCRIPT).is_file();
        if has_install_script {
            let spec = CommandSpec::new(&self.python_program, ProcessConfig::INSTALL_SCRIPT_TIMEOUT)
                .arg(INSTALL_SCRIPT)
                .current_dir(&node_path);
            if let Err(e) = run_step(&spec).await {
                warn!("install.py for {} failed: {}", node_name, e);
                result.warnings.push(format!("install.py failed: {}", e));
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let previous: Option<NodeInstallInfo> =
            atomic_read_json(&NodeInstallInfo::path_in(&node_path)).unwrap_or_default();
        let info = NodeInstallInfo {
            node_name: node_name.to_string(),
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
            installed_at: match (&previous, action) {
                (Some(prev), NodeAction::Updated) => prev.installed_at.clone(),
                _ => now.clone(),
            },
            updated_at: (action == NodeAction::Updated).then(|| now.clone()),
            has_requirements,
            has_install_script,
            installed_packages,
        };
        if let Err(e) = atomic_write_json(&NodeInstallInfo::path_in(&node_path), &info) {
            warn!("Failed to write install info for {}: {}", node_name, e);
            result.warnings.push(format!("Failed to write install info: {}", e));
        }
        result.install_info = Some(info);

        info!(
            "Custom node {} {:?} ({} warnings)",
            node_name,
            action,
            result.warnings.len()
        );
        result
    }

    /// List custom nodes on the cache volume, sorted by name.
    pub fn list(&self) -> Result<Vec<InstalledCustomNode>> {
        if !self.cache_nodes_dir.exists() {
            debug!(
                "Custom nodes directory does not exist: {}",
                self.cache_nodes_dir.display()
            );
            return Ok(vec![]);
        }

        let entries = std::fs::read_dir(&self.cache_nodes_dir).map_err(|e| VolumeError::Io {
            message: format!("Failed to read custom_nodes directory: {}", e),
            path: Some(self.cache_nodes_dir.clone()),
            source: Some(e),
        })?;

        let mut nodes = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }

            let install_info = atomic_read_json(&NodeInstallInfo::path_in(&path)).unwrap_or_else(|e| {
                debug!("Ignoring unreadable install info for {}: {}", name, e);
                None
            });

            nodes.push(InstalledCustomNode {
                valid: path.join(PACKAGE_MARKER).is_file(),
                has_requirements: path.join(REQUIREMENTS_FILE).is_file(),
                is_git_repo: path.join(".git").exists(),
                linked: std::fs::symlink_metadata(self.runtime_nodes_dir.join(&name)).is_ok(),
                install_info,
                path,
                name,
            });
        }

        nodes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(nodes)
    }

    /// Delete a node from the cache volume and drop its runtime symlink.
    ///
    /// A runtime entry that is not a symlink to this node is left alone.
    pub fn remove(&self, node_name: &str) -> Result<RemoveResult> {
        validate_node_name(node_name)?;
        let node_path = self.node_path(node_name);

        if !node_path.is_dir() {
            warn!("Custom node not found: {}", node_name);
            return Err(VolumeError::NodeNotFound {
                name: node_name.to_string(),
            });
        }

        let runtime_entry = self.runtime_nodes_dir.join(node_name);
        let removed_runtime_link = match std::fs::read_link(&runtime_entry) {
            Ok(target) if target == node_path => match std::fs::remove_file(&runtime_entry) {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to remove runtime link {}: {}", runtime_entry.display(), e);
                    false
                }
            },
            _ => false,
        };

        info!("Removing custom node: {}", node_name);
        std::fs::remove_dir_all(&node_path).map_err(|e| VolumeError::Io {
            message: format!("Failed to remove custom node directory: {}", e),
            path: Some(node_path),
            source: Some(e),
        })?;

        Ok(RemoveResult {
            success: true,
            node_name: node_name.to_string(),
            removed_runtime_link,
        })
    }

    /// Check every runtime custom node entry for an importable package.
    pub fn verify(&self) -> Vec<NodeVerification> {
        if !self.runtime_nodes_dir.is_dir() {
            return Vec::new();
        }

        WalkDir::new(&self.runtime_nodes_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter(|e| e.path().is_dir() || e.path_is_symlink())
            .filter(|e| e.file_name() != "__pycache__")
            .map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let path = e.path();
                let reason = if !path.exists() {
                    Some("dangling symlink".to_string())
                } else if !path.join(PACKAGE_MARKER).is_file() {
                    Some(format!("missing {}", PACKAGE_MARKER))
                } else {
                    None
                };
                if let Some(reason) = &reason {
                    warn!("Custom node {} is not importable: {}", name, reason);
                }
                NodeVerification {
                    name,
                    valid: reason.is_none(),
                    reason,
                }
            })
            .collect()
    }

    /// Install `requirements.txt` for every cached node that has one.
    pub async fn install_linked_requirements(&self) -> Result<Vec<RequirementsOutcome>> {
        let mut outcomes = Vec::new();
        for node in self.list()? {
            if !node.has_requirements {
                continue;
            }
            let outcome = match self.install_requirements(&node.path).await {
                Ok(()) => RequirementsOutcome {
                    node_name: node.name,
                    success: true,
                    error: None,
                },
                Err(e) => {
                    warn!("Dependency install for {} failed: {}", node.name, e);
                    RequirementsOutcome {
                        node_name: node.name,
                        success: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    async fn install_requirements(&self, node_path: &Path) -> Result<()> {
        let spec = CommandSpec::new(&self.pip_program, ProcessConfig::PIP_INSTALL_TIMEOUT)
            .args(["install", "-r", REQUIREMENTS_FILE])
            .current_dir(node_path);
        run_step(&spec).await
    }

    /// Fresh clone; `Some(result)` when the clone did not succeed.
    async fn clone_repo(
        &self,
        node_name: &str,
        node_path: &Path,
        repo_url: &str,
        branch: &str,
    ) -> Result<Option<InstallResult>> {
        if !self.cache_nodes_dir.exists() {
            std::fs::create_dir_all(&self.cache_nodes_dir).map_err(|e| VolumeError::Io {
                message: format!("Failed to create custom_nodes directory: {}", e),
                path: Some(self.cache_nodes_dir.clone()),
                source: Some(e),
            })?;
        }

        info!("Installing custom node {} ({})", node_name, branch);
        let spec = CommandSpec::new(&self.git_program, self.clone_timeout).args([
            "clone".to_string(),
            "-b".to_string(),
            branch.to_string(),
            "--depth".to_string(),
            "1".to_string(),
            repo_url.to_string(),
            node_path.to_string_lossy().into_owned(),
        ]);

        let failed = match run_command(&spec).await {
            Ok(output) if output.success() => return Ok(None),
            Ok(output) => InstallResult::new(node_name, node_path.to_path_buf(), NodeAction::Failed)
                .with_error(format!("Git clone failed: {}", output.summary())),
            Err(VolumeError::Timeout(t)) => {
                InstallResult::new(node_name, node_path.to_path_buf(), NodeAction::Timeout)
                    .with_error(format!("Git clone timed out after {:?}", t))
            }
            Err(e) => InstallResult::new(node_name, node_path.to_path_buf(), NodeAction::Failed)
                .with_error(e.to_string()),
        };

        error!("Failed to clone {}: {:?}", node_name, failed.error);
        if node_path.exists() {
            if let Err(e) = std::fs::remove_dir_all(node_path) {
                warn!("Failed to clean up partial clone {}: {}", node_path.display(), e);
            }
        }
        Ok(Some(failed))
    }

    /// Pull in place; `Some(result)` when the pull did not succeed.
    async fn pull(&self, node_name: &str, node_path: &Path) -> Option<InstallResult> {
        info!("Updating custom node: {}", node_name);
        let spec = CommandSpec::new(&self.git_program, self.pull_timeout).args([
            "-C".to_string(),
            node_path.to_string_lossy().into_owned(),
            "pull".to_string(),
            "--ff-only".to_string(),
        ]);

        let failed = match run_command(&spec).await {
            Ok(output) if output.success() => return None,
            Ok(output) => InstallResult::new(node_name, node_path.to_path_buf(), NodeAction::Failed)
                .with_error(format!("Git pull failed: {}", output.summary())),
            Err(VolumeError::Timeout(t)) => {
                InstallResult::new(node_name, node_path.to_path_buf(), NodeAction::Timeout)
                    .with_error(format!("Git pull timed out after {:?}", t))
            }
            Err(e) => InstallResult::new(node_name, node_path.to_path_buf(), NodeAction::Failed)
                .with_error(e.to_string()),
        };
        error!("Failed to update {}: {:?}", node_name, failed.error);
        Some(failed)
    }
}

/// Run a best-effort step, mapping a non-zero exit to an error.
async fn run_step(spec: &CommandSpec) -> Result<()> {
    let output = run_command(spec).await?;
    if output.success() {
        Ok(())
    } else {
        Err(VolumeError::CommandFailed {
            command: spec.display(),
            message: output.summary(),
        })
    }
}

/// Package specifiers listed in a node's `requirements.txt`.
fn read_requirements(node_path: &Path) -> Vec<String> {
    std::fs::read_to_string(node_path.join(REQUIREMENTS_FILE))
        .map(|contents| {
            contents
                .lines()
                .map(|l| l.split('#').next().unwrap_or("").trim())
                .filter(|l| !l.is_empty() && !l.starts_with('-'))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Reject names that would escape the custom node directory.
pub fn validate_node_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(VolumeError::validation("node_name", "must not be empty"));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(VolumeError::validation(
            "node_name",
            format!("invalid node name '{}'", name),
        ));
    }
    if name.starts_with('.') {
        return Err(VolumeError::validation(
            "node_name",
            format!("hidden names are reserved: '{}'", name),
        ));
    }
    Ok(())
}

/// Extract the node name from a git URL.
///
/// Examples:
/// - `https://github.com/user/ComfyUI-CustomNode.git` -> `ComfyUI-CustomNode`
/// - `https://github.com/user/ComfyUI-CustomNode` -> `ComfyUI-CustomNode`
/// - `git@github.com:user/ComfyUI-CustomNode.git` -> `ComfyUI-CustomNode`
pub fn extract_node_name_from_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let name = url.rsplit('/').next().unwrap_or(url);
    let name = name.rsplit(':').next().unwrap_or(name);
    let name = name.strip_suffix(".git").unwrap_or(name);
    name.to_string()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        layout: VolumeLayout,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            let layout = VolumeLayout::new(
                temp.path().join("cache"),
                temp.path().join("ComfyUI"),
                vec!["loras".to_string()],
            );
            Self { temp, layout }
        }

        fn script(&self, name: &str, body: &str) -> String {
            let path = self.temp.path().join(name);
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        /// `git clone -b BRANCH --depth 1 URL DEST` creates a package with requirements
        fn manager(&self, pip_body: &str) -> CustomNodesManager {
            let git = self.script(
                "git",
                r#"if [ "$1" = "clone" ]; then
  mkdir -p "$7/.git" && touch "$7/__init__.py" && printf 'torch\n# comment\nnumpy>=1.0\n' > "$7/requirements.txt"
  exit 0
fi
if [ "$1" = "-C" ]; then echo "Already up to date."; exit 0; fi
exit 1"#,
            );
            let pip = self.script("pip", pip_body);
            let python = self.script("python", "exit 0");
            CustomNodesManager::new(&self.layout).with_programs(&git, &pip, &python)
        }
    }

    #[test]
    fn test_extract_node_name_from_url() {
        assert_eq!(
            extract_node_name_from_url("https://github.com/user/ComfyUI-Manager.git"),
            "ComfyUI-Manager"
        );
        assert_eq!(
            extract_node_name_from_url("https://github.com/user/ComfyUI-Manager/"),
            "ComfyUI-Manager"
        );
        assert_eq!(
            extract_node_name_from_url("git@github.com:user/ComfyUI-Manager.git"),
            "ComfyUI-Manager"
        );
    }

    #[test]
    fn test_validate_node_name() {
        assert!(validate_node_name("ComfyUI-Manager").is_ok());
        for bad in ["", "..", "a/b", "a\\b", "x..y", ".hidden"] {
            assert!(validate_node_name(bad).is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn test_install_clones_and_records_info() {
        let fx = Fixture::new();
        let manager = fx.manager("exit 0");

        let result = manager
            .install("https://github.com/ltdrdata/ComfyUI-Manager.git", None)
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.action, NodeAction::Installed);
        assert!(result.warnings.is_empty());
        let info = result.install_info.unwrap();
        assert_eq!(info.branch, "main");
        assert_eq!(info.installed_packages, vec!["torch", "numpy>=1.0"]);
        assert!(info.updated_at.is_none());

        let on_disk: NodeInstallInfo =
            atomic_read_json(&NodeInstallInfo::path_in(&manager.node_path("ComfyUI-Manager")))
                .unwrap()
                .unwrap();
        assert_eq!(on_disk.repo_url, "https://github.com/ltdrdata/ComfyUI-Manager.git");
    }

    #[tokio::test]
    async fn test_reinstall_updates_in_place() {
        let fx = Fixture::new();
        let manager = fx.manager("exit 0");
        let url = "https://github.com/user/NodeA";

        let first = manager.install(url, Some("dev")).await.unwrap();
        let second = manager.install(url, Some("dev")).await.unwrap();

        assert_eq!(second.action, NodeAction::Updated);
        let info = second.install_info.unwrap();
        assert_eq!(info.installed_at, first.install_info.unwrap().installed_at);
        assert!(info.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_reinstall_with_other_branch_keeps_recorded_branch() {
        let fx = Fixture::new();
        let manager = fx.manager("exit 0");
        let url = "https://github.com/user/NodeA";

        manager.install(url, Some("dev")).await.unwrap();
        let second = manager.install(url, Some("main")).await.unwrap();

        assert_eq!(second.action, NodeAction::Updated);
        assert_eq!(second.warnings.len(), 1);
        assert!(second.warnings[0].contains("'main'"));
        assert_eq!(second.install_info.unwrap().branch, "dev");
    }

    #[tokio::test]
    async fn test_update_by_name_pulls_and_refreshes_info() {
        let fx = Fixture::new();
        let pip_log = fx.temp.path().join("pip.log");
        let manager = fx.manager(&format!("echo run >> '{}'", pip_log.display()));
        let url = "https://github.com/user/NodeA.git";

        let first = manager.install(url, Some("dev")).await.unwrap();
        let updated = manager.update("NodeA").await.unwrap();

        assert!(updated.success, "{:?}", updated.error);
        assert_eq!(updated.action, NodeAction::Updated);
        let info = updated.install_info.unwrap();
        assert_eq!(info.repo_url, url);
        assert_eq!(info.branch, "dev");
        assert_eq!(info.installed_at, first.install_info.unwrap().installed_at);
        assert!(info.updated_at.is_some());
        assert_eq!(fs::read_to_string(&pip_log).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_update_rejects_missing_and_invalid_names() {
        let fx = Fixture::new();
        let manager = fx.manager("exit 0");
        assert!(matches!(
            manager.update("Nope").await.unwrap_err(),
            VolumeError::NodeNotFound { .. }
        ));
        assert!(matches!(
            manager.update("../x").await.unwrap_err(),
            VolumeError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_pull_failure_is_reported() {
        let fx = Fixture::new();
        let git = fx.script(
            "git-nopull",
            r#"if [ "$1" = "-C" ]; then echo "fatal: Not possible to fast-forward" >&2; exit 1; fi
exit 1"#,
        );
        let manager = CustomNodesManager::new(&fx.layout).with_programs(&git, "pip", "python");
        fs::create_dir_all(manager.node_path("NodeA").join(".git")).unwrap();

        let result = manager.update("NodeA").await.unwrap();
        assert!(!result.success);
        assert_eq!(result.action, NodeAction::Failed);
        assert!(result.error.unwrap().contains("fast-forward"));
    }

    #[tokio::test]
    async fn test_existing_non_git_directory_is_skipped() {
        let fx = Fixture::new();
        let manager = fx.manager("exit 0");
        fs::create_dir_all(manager.node_path("NodeA")).unwrap();

        let result = manager.install("https://github.com/user/NodeA", None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.action, NodeAction::Skipped);
        assert!(!manager.node_path("NodeA").join(".install_info.json").exists());
    }

    #[tokio::test]
    async fn test_dependency_failure_is_a_warning() {
        let fx = Fixture::new();
        let manager = fx.manager("echo 'No matching distribution' >&2; exit 1");

        let result = manager.install("https://github.com/user/NodeA", None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.action, NodeAction::Installed);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("No matching distribution"));
        assert!(result.install_info.unwrap().installed_packages.is_empty());
    }

    #[tokio::test]
    async fn test_clone_failure_leaves_no_directory() {
        let fx = Fixture::new();
        let git = fx.script(
            "git-fail",
            r#"mkdir -p "$7"; echo "fatal: repository not found" >&2; exit 128"#,
        );
        let manager = CustomNodesManager::new(&fx.layout).with_programs(&git, "pip", "python");

        let result = manager.install("https://github.com/user/Missing", None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.action, NodeAction::Failed);
        assert!(result.error.unwrap().contains("repository not found"));
        assert!(!manager.node_path("Missing").exists());
    }

    #[tokio::test]
    async fn test_clone_timeout() {
        let fx = Fixture::new();
        let git = fx.script("git-slow", "sleep 5");
        let manager = CustomNodesManager::new(&fx.layout)
            .with_programs(&git, "pip", "python")
            .with_git_timeouts(Duration::from_millis(200), Duration::from_millis(200));

        let result = manager.install("https://github.com/user/Slow", None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.action, NodeAction::Timeout);
    }

    #[test]
    fn test_list_reports_validity() {
        let fx = Fixture::new();
        let manager = CustomNodesManager::new(&fx.layout);
        let nodes_dir = fx.layout.cache_nodes_dir();
        fs::create_dir_all(nodes_dir.join("b-node")).unwrap();
        fs::create_dir_all(nodes_dir.join("A-Node")).unwrap();
        fs::create_dir_all(nodes_dir.join(".hidden")).unwrap();
        fs::write(nodes_dir.join("A-Node").join("__init__.py"), "").unwrap();
        fs::write(nodes_dir.join("A-Node").join("requirements.txt"), "torch").unwrap();

        let nodes = manager.list().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].name, "A-Node");
        assert!(nodes[0].valid);
        assert!(nodes[0].has_requirements);
        assert!(!nodes[1].valid);
        assert!(!nodes[1].linked);
    }

    #[test]
    fn test_remove_drops_runtime_symlink() {
        let fx = Fixture::new();
        let manager = CustomNodesManager::new(&fx.layout);
        let node = manager.node_path("NodeA");
        fs::create_dir_all(&node).unwrap();
        fs::create_dir_all(fx.layout.runtime_nodes_dir()).unwrap();
        let link = fx.layout.runtime_nodes_dir().join("NodeA");
        std::os::unix::fs::symlink(&node, &link).unwrap();

        let result = manager.remove("NodeA").unwrap();
        assert!(result.removed_runtime_link);
        assert!(!node.exists());
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn test_remove_keeps_builtin_runtime_directory() {
        let fx = Fixture::new();
        let manager = CustomNodesManager::new(&fx.layout);
        fs::create_dir_all(manager.node_path("NodeA")).unwrap();
        let builtin = fx.layout.runtime_nodes_dir().join("NodeA");
        fs::create_dir_all(&builtin).unwrap();

        let result = manager.remove("NodeA").unwrap();
        assert!(!result.removed_runtime_link);
        assert!(builtin.is_dir());
    }

    #[test]
    fn test_remove_rejects_traversal_and_missing() {
        let fx = Fixture::new();
        let manager = CustomNodesManager::new(&fx.layout);
        assert!(matches!(
            manager.remove("../models").unwrap_err(),
            VolumeError::Validation { .. }
        ));
        assert!(matches!(
            manager.remove("Nope").unwrap_err(),
            VolumeError::NodeNotFound { .. }
        ));
    }

    #[test]
    fn test_verify_runtime_entries() {
        let fx = Fixture::new();
        let manager = CustomNodesManager::new(&fx.layout);
        let runtime = fx.layout.runtime_nodes_dir();
        fs::create_dir_all(runtime.join("Good")).unwrap();
        fs::write(runtime.join("Good").join("__init__.py"), "").unwrap();
        fs::create_dir_all(runtime.join("NoInit")).unwrap();
        std::os::unix::fs::symlink(fx.temp.path().join("gone"), runtime.join("Dangling")).unwrap();
        fs::write(runtime.join("example_node.py.example"), "").unwrap();

        let checks = manager.verify();
        let names: Vec<_> = checks.iter().map(|c| (c.name.as_str(), c.valid)).collect();
        assert_eq!(
            names,
            vec![("Dangling", false), ("Good", true), ("NoInit", false)]
        );
        assert_eq!(checks[0].reason.as_deref(), Some("dangling symlink"));
    }

    #[tokio::test]
    async fn test_install_linked_requirements() {
        let fx = Fixture::new();
        let manager = fx.manager("exit 0");
        let nodes_dir = fx.layout.cache_nodes_dir();
        fs::create_dir_all(nodes_dir.join("WithReqs")).unwrap();
        fs::write(nodes_dir.join("WithReqs").join("requirements.txt"), "torch").unwrap();
        fs::create_dir_all(nodes_dir.join("NoReqs")).unwrap();

        let outcomes = manager.install_linked_requirements().await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].node_name, "WithReqs");
        assert!(outcomes[0].success);
    }
}
