//! Hot reload: refresh the shared volume, then link anything new.

mod refresh;

pub use refresh::{refresher_from_config, CommandRefresher, NoopRefresher, VolumeRefresher};

use crate::layout::VolumeLayout;
use crate::link::{link_volume, LinkReport};
use crate::{Result, VolumeError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Body of a successful reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub linked_count: usize,
    pub models: LinkReport,
    pub nodes: LinkReport,
    pub message: String,
}

/// Serialises reloads within one process.
pub struct VolumeReloader {
    layout: VolumeLayout,
    refresher: Arc<dyn VolumeRefresher>,
    lock: Mutex<()>,
}

impl VolumeReloader {
    pub fn new(layout: VolumeLayout, refresher: Arc<dyn VolumeRefresher>) -> Self {
        Self {
            layout,
            refresher,
            lock: Mutex::new(()),
        }
    }

    pub fn layout(&self) -> &VolumeLayout {
        &self.layout
    }

    /// Refresh the volume and link new models and nodes.
    pub async fn reload(&self) -> Result<ReloadResponse> {
        let _guard = self.lock.lock().await;

        info!("Reloading volume (refresher: {})", self.refresher.name());
        if let Err(e) = self.refresher.refresh().await {
            error!("Volume refresh failed: {}", e);
            return Err(e);
        }

        let layout = self.layout.clone();
        let report = tokio::task::spawn_blocking(move || link_volume(&layout))
            .await
            .map_err(|e| VolumeError::Other(format!("link task failed: {}", e)))??;

        let linked_count = report.linked_count();
        let mut message = format!("Linked {} new assets", linked_count);
        if report.failed_count() > 0 {
            message.push_str(&format!(" ({} failed)", report.failed_count()));
        }

        Ok(ReloadResponse {
            success: true,
            linked_count,
            models: report.models,
            nodes: report.nodes,
            message,
        })
    }
}
