//! Volume refresh seam.
//!
//! Network volumes shared between containers may need an explicit refresh
//! before new files written by another container become visible. The
//! refresher runs before every hot reload.

use crate::config::{ProcessConfig, VolumeConfig};
use crate::process::{run_checked, CommandSpec};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Makes the latest contents of the shared volume visible to this process.
#[async_trait]
pub trait VolumeRefresher: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn refresh(&self) -> Result<()>;
}

/// For local or already-consistent volumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefresher;

#[async_trait]
impl VolumeRefresher for NoopRefresher {
    fn name(&self) -> &str {
        "noop"
    }

    async fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Runs a configured command and requires a zero exit.
#[derive(Debug, Clone)]
pub struct CommandRefresher {
    spec: CommandSpec,
}

impl CommandRefresher {
    pub fn new(argv: &[String]) -> Result<Self> {
        Self::with_timeout(argv, ProcessConfig::VOLUME_REFRESH_TIMEOUT)
    }

    pub fn with_timeout(argv: &[String], timeout: Duration) -> Result<Self> {
        Ok(Self {
            spec: CommandSpec::from_argv(argv, timeout)?,
        })
    }
}

#[async_trait]
impl VolumeRefresher for CommandRefresher {
    fn name(&self) -> &str {
        &self.spec.program
    }

    async fn refresh(&self) -> Result<()> {
        run_checked(&self.spec).await?;
        info!("Volume refreshed via `{}`", self.spec.display());
        Ok(())
    }
}

/// Pick a refresher from configuration.
pub fn refresher_from_config(config: &VolumeConfig) -> Result<Arc<dyn VolumeRefresher>> {
    match config.refresh_command.as_deref() {
        Some(argv) if !argv.is_empty() => Ok(Arc::new(CommandRefresher::new(argv)?)),
        _ => Ok(Arc::new(NoopRefresher)),
    }
}
