//! Command-line interface: argument types and the one-shot commands.

use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_volume_core::config::EnvVars;
use comfy_volume_core::link::AssetLinker;
use comfy_volume_core::models::{ModelAction, ModelActionResult};
use comfy_volume_core::network::{trigger_reload, HttpClient};
use comfy_volume_core::volume::refresher_from_config;
use comfy_volume_core::{ModelStore, VolumeConfig, VolumeLayout, VolumeReloader};
use comfy_volume_nodes::{CustomNodesManager, InstallResult, NodeAction};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "comfy-volume")]
#[command(about = "Shared model volume manager and inference façade")]
pub struct Cli {
    /// Shared cache volume root
    #[arg(long, global = true)]
    pub cache_root: Option<PathBuf>,

    /// Inference engine installation root
    #[arg(long, global = true)]
    pub runtime_root: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, env = EnvVars::CONFIG)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Link the volume, then serve the HTTP API
    Serve(ServeArgs),
    /// Link cached assets into the engine tree once and print a report
    Link(LinkArgs),
    /// Manage cached models and custom nodes
    Manage(ManageArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "8000")]
    pub port: u16,

    /// Base URL of the inference engine
    #[arg(long)]
    pub upstream_url: Option<String>,

    /// Workflow template used by `/api`
    #[arg(long)]
    pub workflow: Option<PathBuf>,

    /// Skip linking at startup
    #[arg(long)]
    pub no_link: bool,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Report what would be linked without touching the filesystem
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManageAction {
    List,
    Hf,
    Url,
    Import,
    Delete,
    Reload,
    Diagnose,
    ListNodes,
    InstallNode,
    UpdateNode,
    RemoveNode,
}

impl ManageAction {
    fn label(self) -> &'static str {
        match self {
            ManageAction::List => "list",
            ManageAction::Hf => "hf",
            ManageAction::Url => "url",
            ManageAction::Import => "import",
            ManageAction::Delete => "delete",
            ManageAction::Reload => "reload",
            ManageAction::Diagnose => "diagnose",
            ManageAction::ListNodes => "list-nodes",
            ManageAction::InstallNode => "install-node",
            ManageAction::UpdateNode => "update-node",
            ManageAction::RemoveNode => "remove-node",
        }
    }
}

#[derive(Args, Debug)]
pub struct ManageArgs {
    #[arg(long, value_enum)]
    pub action: ManageAction,

    /// HuggingFace repository (`owner/name`)
    #[arg(long)]
    pub repo_id: Option<String>,

    #[arg(long)]
    pub filename: Option<String>,

    /// Model category
    #[arg(long = "type")]
    pub model_type: Option<String>,

    /// HuggingFace revision
    #[arg(long)]
    pub revision: Option<String>,

    /// Direct download URL
    #[arg(long)]
    pub url: Option<String>,

    /// Local model file to copy into the cache
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Custom node git repository
    #[arg(long)]
    pub repo_url: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    #[arg(long)]
    pub node_name: Option<String>,

    /// Hot reload endpoint of a running server
    #[arg(long)]
    pub reload_url: Option<String>,

    /// Do not notify a running server after a change
    #[arg(long)]
    pub no_reload: bool,
}

/// Argument combinations clap cannot express on its own.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("--{flag} is required for --action {action}")]
    MissingArgument {
        flag: &'static str,
        action: &'static str,
    },
}

fn required<'a>(
    value: &'a Option<String>,
    flag: &'static str,
    action: ManageAction,
) -> Result<&'a str, UsageError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or(UsageError::MissingArgument {
            flag,
            action: action.label(),
        })
}

fn required_path<'a>(
    value: &'a Option<PathBuf>,
    flag: &'static str,
    action: ManageAction,
) -> Result<&'a Path, UsageError> {
    value
        .as_deref()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or(UsageError::MissingArgument {
            flag,
            action: action.label(),
        })
}

impl Cli {
    /// Config file, then environment, then command-line flags.
    pub fn resolve_config(&self) -> anyhow::Result<VolumeConfig> {
        let mut config = VolumeConfig::load(self.config.as_deref())?;
        config.apply_env();
        if let Some(root) = &self.cache_root {
            config.cache_root = root.clone();
        }
        if let Some(root) = &self.runtime_root {
            config.runtime_root = root.clone();
        }
        if let Command::Serve(args) = &self.command {
            if let Some(url) = &args.upstream_url {
                config.upstream_url = url.clone();
            }
            if let Some(path) = &args.workflow {
                config.workflow_path = path.clone();
            }
        }
        Ok(config)
    }
}

/// `link`: plan (dry run) or apply the startup links.
pub fn run_link(config: &VolumeConfig, args: &LinkArgs) -> anyhow::Result<Value> {
    let linker = AssetLinker::new(VolumeLayout::from_config(config));

    if args.dry_run {
        let plan = linker.preview()?;
        return Ok(json!({
            "success": true,
            "dry_run": true,
            "would_link": plan.creates().count(),
            "plan": plan,
        }));
    }

    let report = linker.link_volume()?;
    info!(
        "Linked {} new assets ({} failed)",
        report.linked_count(),
        report.failed_count()
    );
    Ok(json!({
        "success": report.failed_count() == 0,
        "linked_count": report.linked_count(),
        "models": report.models,
        "nodes": report.nodes,
    }))
}

/// `manage`: run one action and return its JSON result.
pub async fn run_manage(config: &VolumeConfig, args: &ManageArgs) -> anyhow::Result<Value> {
    let action = args.action;
    let store = ModelStore::from_config(config)?;
    let nodes = CustomNodesManager::from_config(config);

    let mut result = match action {
        ManageAction::List => serde_json::to_value(store.list_models())?,
        ManageAction::Hf => {
            let repo_id = required(&args.repo_id, "repo-id", action)?;
            let filename = required(&args.filename, "filename", action)?;
            let category = required(&args.model_type, "type", action)?;
            let outcome = store
                .download_from_hf(repo_id, filename, category, args.revision.as_deref())
                .await?;
            model_result(outcome)?
        }
        ManageAction::Url => {
            let url = required(&args.url, "url", action)?;
            let category = required(&args.model_type, "type", action)?;
            let outcome = store
                .download_from_url(url, args.filename.as_deref(), category)
                .await?;
            model_result(outcome)?
        }
        ManageAction::Import => {
            let path = required_path(&args.path, "path", action)?;
            let category = required(&args.model_type, "type", action)?;
            model_result(store.import_local(path, category, args.filename.as_deref())?)?
        }
        ManageAction::Delete => {
            let filename = required(&args.filename, "filename", action)?;
            let category = required(&args.model_type, "type", action)?;
            model_result(store.delete_model(category, filename)?)?
        }
        ManageAction::Reload => return reload(config, args).await,
        ManageAction::Diagnose => json!({
            "cache_root": config.cache_root,
            "runtime_root": config.runtime_root,
            "models": store.list_models(),
            "nodes": nodes.list()?,
            "runtime_nodes": store.runtime_node_entries(),
            "verification": nodes.verify(),
        }),
        ManageAction::ListNodes => json!({"nodes": nodes.list()?}),
        ManageAction::InstallNode => {
            let repo_url = required(&args.repo_url, "repo-url", action)?;
            node_result(nodes.install(repo_url, args.branch.as_deref()).await?)?
        }
        ManageAction::UpdateNode => {
            let name = required(&args.node_name, "node-name", action)?;
            node_result(nodes.update(name).await?)?
        }
        ManageAction::RemoveNode => {
            let name = required(&args.node_name, "node-name", action)?;
            serde_json::to_value(nodes.remove(name)?)?
        }
    };

    if result.get("changed").and_then(Value::as_bool) == Some(true) {
        notify_reload(config, args, &mut result).await;
    }
    if let Some(map) = result.as_object_mut() {
        map.remove("changed");
    }
    Ok(result)
}

fn model_result(outcome: ModelActionResult) -> anyhow::Result<Value> {
    let changed = matches!(
        outcome.action,
        ModelAction::Downloaded | ModelAction::Imported | ModelAction::Deleted
    );
    let mut value = serde_json::to_value(outcome)?;
    value["changed"] = Value::Bool(changed);
    Ok(value)
}

fn node_result(outcome: InstallResult) -> anyhow::Result<Value> {
    let changed = matches!(outcome.action, NodeAction::Installed | NodeAction::Updated);
    let mut value = serde_json::to_value(outcome)?;
    value["changed"] = Value::Bool(changed);
    Ok(value)
}

fn reload_url<'a>(config: &'a VolumeConfig, args: &'a ManageArgs) -> Option<&'a str> {
    args.reload_url
        .as_deref()
        .or(config.reload_url.as_deref())
        .filter(|u| !u.trim().is_empty())
}

/// Ask a running server to relink, or relink locally when none is configured.
async fn reload(config: &VolumeConfig, args: &ManageArgs) -> anyhow::Result<Value> {
    if let Some(url) = reload_url(config, args) {
        let summary = trigger_reload(&HttpClient::new()?, url).await?;
        return Ok(serde_json::to_value(summary)?);
    }

    let reloader = VolumeReloader::new(
        VolumeLayout::from_config(config),
        refresher_from_config(config)?,
    );
    Ok(serde_json::to_value(reloader.reload().await?)?)
}

/// Best-effort post-change reload; the outcome is recorded under `reload`.
async fn notify_reload(config: &VolumeConfig, args: &ManageArgs, result: &mut Value) {
    if args.no_reload {
        return;
    }
    let Some(url) = reload_url(config, args) else {
        return;
    };

    let outcome = match HttpClient::new() {
        Ok(http) => trigger_reload(&http, url).await,
        Err(e) => Err(e),
    };
    result["reload"] = match outcome {
        Ok(summary) => json!(summary),
        Err(e) => {
            warn!("Reload via {} failed: {}", url, e);
            json!({"success": false, "error": e.to_string()})
        }
    };
}
