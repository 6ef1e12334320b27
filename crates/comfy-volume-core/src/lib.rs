//! Core library for comfy-volume.
//!
//! Keeps an inference engine's model and custom node directories in sync with
//! a shared cache volume:
//!
//! - [`link`]: symlink cached assets into the engine tree, never overwriting
//! - [`volume`]: hot reload (refresh the volume, then link)
//! - [`models`]: list, download, and delete cached models
//! - [`network`]: HTTP downloads, HuggingFace URLs, health checks
//! - [`process`]: external commands with timeouts
//! - [`workflow`]: per-request workflow template preparation

pub mod config;
pub mod error;
pub mod layout;
pub mod link;
pub mod metadata;
pub mod models;
pub mod network;
pub mod process;
pub mod volume;
pub mod workflow;

pub use config::VolumeConfig;
pub use error::{Result, VolumeError};
pub use layout::VolumeLayout;
pub use link::{link_assets, link_nodes, link_volume, AssetLinker, LinkReport, VolumeLinkReport};
pub use models::ModelStore;
pub use volume::{ReloadResponse, VolumeReloader};
