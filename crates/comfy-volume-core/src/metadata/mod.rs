//! Provenance sidecars and JSON persistence.
//!
//! - Atomic JSON file operations
//! - Sidecar records for downloaded models and installed custom nodes

mod atomic;
mod sidecar;

pub use atomic::{atomic_read_json, atomic_write_json};
pub use sidecar::{model_info_path, ModelInfo, ModelSource, NodeInstallInfo};
