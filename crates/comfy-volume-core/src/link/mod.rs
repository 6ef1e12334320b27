//! Asset linker.
//!
//! Exposes cached models and custom nodes to the inference engine by creating
//! symlinks under the runtime root. The linker only ever adds links: an entry
//! whose target path already exists (file, directory, or dangling symlink) is
//! reported as skipped and left untouched.
//!
//! Linking is split into a side-effect-free [`AssetLinker::preview`] and an
//! [`AssetLinker::apply`] step so the CLI can offer a dry run.

mod types;

pub use types::{
    LinkAction, LinkDecision, LinkOutcome, LinkPlan, LinkReport, LinkStatus, VolumeLinkReport,
};

use crate::error::Result;
use crate::layout::{absolute_path, VolumeLayout};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Names starting with this marker are never linked.
const HIDDEN_MARKER: char = '.';

/// Links a cache volume into one engine installation.
#[derive(Debug, Clone)]
pub struct AssetLinker {
    layout: VolumeLayout,
}

impl AssetLinker {
    pub fn new(layout: VolumeLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// Plan model and custom node links without touching the filesystem.
    pub fn preview(&self) -> Result<LinkPlan> {
        let mut plan = self.preview_models()?;
        plan.extend(self.preview_nodes()?);
        Ok(plan)
    }

    /// Plan model links for every recognized category present in the cache.
    pub fn preview_models(&self) -> Result<LinkPlan> {
        plan_links(
            self.layout.cache_root(),
            &self.layout.runtime_models_dir(),
            self.layout.categories(),
        )
    }

    /// Plan custom node links.
    pub fn preview_nodes(&self) -> Result<LinkPlan> {
        plan_node_links(&self.layout.cache_nodes_dir(), &self.layout.runtime_nodes_dir())
    }

    /// Link models and custom nodes.
    pub fn link_volume(&self) -> Result<VolumeLinkReport> {
        let models = apply_plan(self.preview_models()?);
        let nodes = apply_plan(self.preview_nodes()?);

        let report = VolumeLinkReport { models, nodes };
        info!(
            "Linked {} new assets ({} models, {} nodes, {} failed)",
            report.linked_count(),
            report.models.linked_count(),
            report.nodes.linked_count(),
            report.failed_count()
        );
        Ok(report)
    }

    /// Apply a plan produced by [`AssetLinker::preview`].
    pub fn apply(&self, plan: LinkPlan) -> LinkReport {
        apply_plan(plan)
    }
}

/// Create missing model symlinks from `cache_dir/<category>` into
/// `runtime_dir/<category>` for each category in `categories`.
///
/// Returns the per-entry report; `linked_count()` is the number of new links.
pub fn link_assets(cache_dir: &Path, runtime_dir: &Path, categories: &[String]) -> Result<LinkReport> {
    let plan = plan_links(cache_dir, runtime_dir, categories)?;
    Ok(apply_plan(plan))
}

/// Create missing symlinks for every custom node directory in the cache.
pub fn link_nodes(cache_nodes_dir: &Path, runtime_nodes_dir: &Path) -> Result<LinkReport> {
    let plan = plan_node_links(cache_nodes_dir, runtime_nodes_dir)?;
    Ok(apply_plan(plan))
}

/// Link both models and custom nodes described by `layout`.
pub fn link_volume(layout: &VolumeLayout) -> Result<VolumeLinkReport> {
    AssetLinker::new(layout.clone()).link_volume()
}

/// Plan model links.
///
/// Only names in `categories` are scanned; any other directory under
/// `cache_dir` is ignored. A category missing from the cache contributes
/// nothing, not even a runtime directory, and a missing `cache_dir` yields
/// an empty plan. Relative roots are resolved against the working directory
/// so link targets stay valid from inside the runtime tree.
pub fn plan_links(cache_dir: &Path, runtime_dir: &Path, categories: &[String]) -> Result<LinkPlan> {
    let cache_dir = &absolute_path(cache_dir);
    let runtime_dir = &absolute_path(runtime_dir);
    let mut plan = LinkPlan::new();
    if !cache_dir.is_dir() {
        warn!("Cache directory {} is missing, nothing to link", cache_dir.display());
        return Ok(plan);
    }

    let mut seen = HashSet::new();

    for category in categories {
        if !seen.insert(category.as_str()) {
            continue;
        }
        let source_dir = cache_dir.join(category);
        if !source_dir.is_dir() {
            debug!("Category {} not present in cache", category);
            continue;
        }

        let target_dir = runtime_dir.join(category);
        plan.ensure_dirs.push(target_dir.clone());

        for entry in WalkDir::new(&source_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source_dir.clone());
                    plan.actions.push(LinkAction {
                        category: Some(category.clone()),
                        name: entry_name(&path),
                        target: target_dir.join(entry_name(&path)),
                        source: path,
                        decision: LinkDecision::Fail,
                        reason: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) {
                continue;
            }

            let action = LinkAction {
                category: Some(category.clone()),
                target: target_dir.join(&name),
                source: entry.into_path(),
                name,
                decision: LinkDecision::Create,
                reason: None,
            };
            plan.actions.push(classify(action));
        }
    }

    Ok(plan)
}

/// Plan custom node links.
///
/// Every non-hidden directory under `cache_nodes_dir` is a node. A missing
/// cache directory yields an empty plan.
pub fn plan_node_links(cache_nodes_dir: &Path, runtime_nodes_dir: &Path) -> Result<LinkPlan> {
    let cache_nodes_dir = &absolute_path(cache_nodes_dir);
    let runtime_nodes_dir = &absolute_path(runtime_nodes_dir);
    let mut plan = LinkPlan::new();
    if !cache_nodes_dir.is_dir() {
        debug!("No custom nodes directory at {}", cache_nodes_dir.display());
        return Ok(plan);
    }

    plan.ensure_dirs.push(runtime_nodes_dir.to_path_buf());

    for entry in WalkDir::new(cache_nodes_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read custom node entry: {}", e);
                continue;
            }
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) || !entry.path().is_dir() {
            continue;
        }

        let action = LinkAction {
            category: None,
            target: runtime_nodes_dir.join(&name),
            source: entry.into_path(),
            name,
            decision: LinkDecision::Create,
            reason: None,
        };
        plan.actions.push(classify(action));
    }

    Ok(plan)
}

/// Apply a plan, recording one outcome per entry.
///
/// Never removes or replaces anything at a target path.
pub fn apply_plan(plan: LinkPlan) -> LinkReport {
    let mut report = LinkReport::new();

    let mut unavailable: Vec<(PathBuf, String)> = Vec::new();
    for dir in &plan.ensure_dirs {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!("Failed to create {}: {}", dir.display(), e);
            unavailable.push((dir.clone(), e.to_string()));
        }
    }

    for action in plan.actions {
        match action.decision {
            LinkDecision::Skip => {
                let reason = action
                    .reason
                    .clone()
                    .unwrap_or_else(|| "target exists".to_string());
                report.record(LinkOutcome::from_action(action, LinkStatus::Skipped { reason }));
                continue;
            }
            LinkDecision::Fail => {
                let reason = action
                    .reason
                    .clone()
                    .unwrap_or_else(|| "unreadable entry".to_string());
                report.record(LinkOutcome::from_action(action, LinkStatus::Failed { reason }));
                continue;
            }
            LinkDecision::Create => {}
        }

        let blocked = unavailable
            .iter()
            .find(|(dir, _)| action.target.parent() == Some(dir.as_path()));
        if let Some((dir, err)) = blocked {
            let reason = format!("cannot create {}: {}", dir.display(), err);
            report.record(LinkOutcome::from_action(action, LinkStatus::Failed { reason }));
            continue;
        }

        let status = match create_symlink(&action.source, &action.target) {
            Ok(()) => {
                debug!(
                    "Linked {} -> {}",
                    action.target.display(),
                    action.source.display()
                );
                LinkStatus::Linked
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => LinkStatus::Skipped {
                reason: "target created concurrently".to_string(),
            },
            Err(e) => {
                warn!("Failed to link {}: {}", action.target.display(), e);
                LinkStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };
        report.record(LinkOutcome::from_action(action, status));
    }

    report
}

fn classify(mut action: LinkAction) -> LinkAction {
    match fs::symlink_metadata(&action.target) {
        Ok(meta) => {
            action.decision = LinkDecision::Skip;
            action.reason = Some(if meta.file_type().is_symlink() {
                "symlink exists".to_string()
            } else {
                "target exists".to_string()
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => action.decision = LinkDecision::Create,
        Err(e) => {
            action.decision = LinkDecision::Fail;
            action.reason = Some(format!("cannot inspect target: {}", e));
        }
    }
    action
}

pub(crate) fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_MARKER)
}

fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
pub(crate) fn create_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, target)
}

#[cfg(windows)]
pub(crate) fn create_symlink(source: &Path, target: &Path) -> io::Result<()> {
    if source.is_dir() {
        std::os::windows::fs::symlink_dir(source, target)
    } else {
        std::os::windows::fs::symlink_file(source, target)
    }
}
