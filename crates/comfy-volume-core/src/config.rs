//! Centralized configuration for comfy-volume.
//!
//! Fixed constants live in unit structs grouped by concern. Settings that vary
//! per deployment live in [`VolumeConfig`], loaded from an optional JSON file
//! and then overridden by environment variables and CLI flags.

use crate::error::{Result, VolumeError};
use crate::metadata::atomic_read_json;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(3600);
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
    pub const HEALTH_CHECK_PATH: &'static str = "/system_stats";
    pub const RELOAD_TRIGGER_TIMEOUT: Duration = Duration::from_secs(30);
    pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(1200);
    pub const HF_ENDPOINT: &'static str = "https://huggingface.co";
    pub const HF_DEFAULT_REVISION: &'static str = "main";
    pub const USER_AGENT: &'static str = "comfy-volume/0.1";
}

/// Timeouts for external processes.
pub struct ProcessConfig;

impl ProcessConfig {
    pub const GIT_CLONE_TIMEOUT: Duration = Duration::from_secs(180);
    pub const GIT_PULL_TIMEOUT: Duration = Duration::from_secs(180);
    pub const PIP_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
    pub const INSTALL_SCRIPT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const VOLUME_REFRESH_TIMEOUT: Duration = Duration::from_secs(60);
}

/// Shared directory and file names.
pub struct PathsConfig;

impl PathsConfig {
    pub const DEFAULT_CACHE_ROOT: &'static str = "/cache";
    pub const DEFAULT_RUNTIME_ROOT: &'static str = "/root/comfy/ComfyUI";
    pub const DEFAULT_WORKFLOW_PATH: &'static str = "/root/workflow_api.json";
    pub const MODELS_DIR_NAME: &'static str = "models";
    pub const CUSTOM_NODES_DIR_NAME: &'static str = "custom_nodes";
    pub const HF_CACHE_DIR_NAME: &'static str = "hf_cache";
    pub const NODE_INFO_FILENAME: &'static str = ".install_info.json";
    pub const MODEL_INFO_SUFFIX: &'static str = ".info.json";
}

/// Model category configuration.
pub struct ModelConfig;

impl ModelConfig {
    pub const DEFAULT_CATEGORIES: &'static [&'static str] = &[
        "checkpoints",
        "loras",
        "vae",
        "clip",
        "text_encoders",
        "diffusion_models",
        "controlnet",
        "upscale_models",
        "embeddings",
    ];
}

/// Environment variables read by [`VolumeConfig::apply_env`].
pub struct EnvVars;

impl EnvVars {
    pub const CACHE_ROOT: &'static str = "COMFY_VOLUME_CACHE_ROOT";
    pub const RUNTIME_ROOT: &'static str = "COMFY_VOLUME_RUNTIME_ROOT";
    pub const RELOAD_URL: &'static str = "COMFY_VOLUME_RELOAD_URL";
    pub const REFRESH_CMD: &'static str = "COMFY_VOLUME_REFRESH_CMD";
    pub const UPSTREAM_URL: &'static str = "COMFY_VOLUME_UPSTREAM_URL";
    pub const HF_TOKEN: &'static str = "HF_TOKEN";
    /// Read by the CLI for `--config`
    pub const CONFIG: &'static str = "COMFY_VOLUME_CONFIG";
}

/// Per-deployment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct VolumeConfig {
    /// Shared volume mount point
    pub cache_root: PathBuf,
    /// Inference engine installation root
    pub runtime_root: PathBuf,
    /// Recognized model categories
    pub categories: Vec<String>,
    /// Base URL of the inference engine's own HTTP API
    pub upstream_url: String,
    /// Workflow template used by `/api`
    pub workflow_path: PathBuf,
    /// Node id whose `inputs.text` receives the prompt
    pub prompt_node: String,
    /// Node id whose `inputs.filename_prefix` receives the request id
    pub save_node: String,
    /// Hot reload endpoint of a running server, used by the CLI
    pub reload_url: Option<String>,
    /// Command (argv) that refreshes the shared volume view before a reload
    pub refresh_command: Option<Vec<String>>,
    /// Run `pip install -r requirements.txt` for linked nodes at startup
    pub install_node_requirements: bool,
    /// HuggingFace endpoint
    pub hf_endpoint: String,
    /// HuggingFace token, never written back to disk
    #[serde(skip_serializing)]
    pub hf_token: Option<String>,
    pub git_program: String,
    pub pip_program: String,
    pub python_program: String,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(PathsConfig::DEFAULT_CACHE_ROOT),
            runtime_root: PathBuf::from(PathsConfig::DEFAULT_RUNTIME_ROOT),
            categories: ModelConfig::DEFAULT_CATEGORIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            upstream_url: "http://127.0.0.1:8188".to_string(),
            workflow_path: PathBuf::from(PathsConfig::DEFAULT_WORKFLOW_PATH),
            prompt_node: "6".to_string(),
            save_node: "9".to_string(),
            reload_url: None,
            refresh_command: None,
            install_node_requirements: false,
            hf_endpoint: NetworkConfig::HF_ENDPOINT.to_string(),
            hf_token: None,
            git_program: "git".to_string(),
            pip_program: "pip".to_string(),
            python_program: "python".to_string(),
        }
    }
}

impl VolumeConfig {
    /// Load settings from a JSON file, falling back to defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let config: Option<VolumeConfig> = atomic_read_json(path)?;
        match config {
            Some(config) => {
                debug!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            None => Err(VolumeError::Config {
                message: format!("Config file not found: {}", path.display()),
            }),
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty(EnvVars::CACHE_ROOT) {
            self.cache_root = PathBuf::from(v);
        }
        if let Some(v) = non_empty(EnvVars::RUNTIME_ROOT) {
            self.runtime_root = PathBuf::from(v);
        }
        if let Some(v) = non_empty(EnvVars::RELOAD_URL) {
            self.reload_url = Some(v);
        }
        if let Some(v) = non_empty(EnvVars::UPSTREAM_URL) {
            self.upstream_url = v;
        }
        if let Some(v) = non_empty(EnvVars::REFRESH_CMD) {
            self.refresh_command = Some(v.split_whitespace().map(String::from).collect());
        }
        if let Some(v) = non_empty(EnvVars::HF_TOKEN) {
            self.hf_token = Some(v);
        }
    }
}
