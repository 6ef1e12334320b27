//! Custom node management for comfy-volume.
//!
//! Nodes live on the shared cache volume under `custom_nodes/<name>` and are
//! exposed to the engine by the asset linker. This crate installs, updates,
//! lists, verifies, and removes them.

mod manager;
pub mod types;

pub use manager::{extract_node_name_from_url, validate_node_name, CustomNodesManager};
pub use types::{
    InstallResult, InstalledCustomNode, NodeAction, NodeVerification, RemoveResult,
    RequirementsOutcome,
};
