//! Network utilities.
//!
//! This module provides:
//! - HTTP client wrapper with timeouts and a fixed user agent
//! - Streaming downloads into hidden temp files
//! - HuggingFace resolve URLs
//! - Upstream health probing and the reload trigger client

mod client;
mod download;
mod health;
mod hf;
mod reload;

pub use client::HttpClient;
pub use download::DownloadManager;
pub use health::{health_check_url, HealthChecker};
pub use hf::HfFileRef;
pub use reload::{trigger_reload, ReloadSummary};
