//! Link plan and report types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What the planner decided for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkDecision {
    Create,
    /// Something already exists at the target
    Skip,
    /// The entry or its target could not be inspected
    Fail,
}

/// A single link decision made while scanning the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAction {
    /// Category directory the entry lives in (`None` for custom nodes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Entry name (file or directory name)
    pub name: String,
    /// Path inside the cache volume
    pub source: PathBuf,
    /// Path where the symlink lives (or would live)
    pub target: PathBuf,
    pub decision: LinkDecision,
    /// Why the entry is skipped or failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Decisions for one scan, in scan order, before anything is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkPlan {
    /// Runtime directories that must exist before links are created
    pub ensure_dirs: Vec<PathBuf>,
    pub actions: Vec<LinkAction>,
}

impl LinkPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links applying this plan would create.
    pub fn creates(&self) -> impl Iterator<Item = &LinkAction> {
        self.actions
            .iter()
            .filter(|a| a.decision == LinkDecision::Create)
    }

    /// Append another plan's decisions.
    pub fn extend(&mut self, other: LinkPlan) {
        self.ensure_dirs.extend(other.ensure_dirs);
        self.actions.extend(other.actions);
    }
}

/// What happened to one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LinkStatus {
    Linked,
    Skipped { reason: String },
    Failed { reason: String },
}

/// Outcome for one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    #[serde(flatten)]
    pub status: LinkStatus,
}

impl LinkOutcome {
    pub(crate) fn from_action(action: LinkAction, status: LinkStatus) -> Self {
        Self {
            category: action.category,
            name: action.name,
            source: action.source,
            target: action.target,
            status,
        }
    }
}

/// Result of applying a link plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkReport {
    pub linked: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<LinkOutcome>,
}

impl LinkReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: LinkOutcome) {
        match outcome.status {
            LinkStatus::Linked => self.linked += 1,
            LinkStatus::Skipped { .. } => self.skipped += 1,
            LinkStatus::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Number of links created by this run.
    pub fn linked_count(&self) -> usize {
        self.linked
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Outcomes that failed, for partial-failure summaries.
    pub fn failures(&self) -> impl Iterator<Item = &LinkOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, LinkStatus::Failed { .. }))
    }
}

/// Combined report for models and custom nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeLinkReport {
    pub models: LinkReport,
    pub nodes: LinkReport,
}

impl VolumeLinkReport {
    pub fn linked_count(&self) -> usize {
        self.models.linked_count() + self.nodes.linked_count()
    }

    pub fn failed_count(&self) -> usize {
        self.models.failed + self.nodes.failed
    }
}
