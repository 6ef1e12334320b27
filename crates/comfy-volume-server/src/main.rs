//! comfy-volume - links a shared model volume into an inference engine and
//! serves a small HTTP API in front of it.

use anyhow::Result;
use clap::{error::ErrorKind, CommandFactory, Parser};
use comfy_volume_core::{link_volume, VolumeConfig, VolumeLayout};
use comfy_volume_server::cli::{run_link, run_manage, Cli, Command, ServeArgs, UsageError};
use comfy_volume_server::{start_server, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn init_logging(debug: bool, json_logs: bool) {
    let default_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = if debug {
        EnvFilter::new(default_level.as_str())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level.as_str()))
    };

    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);
    if json_logs {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.json_logs);

    let config = cli.resolve_config()?;

    let outcome = match &cli.command {
        Command::Serve(args) => return serve(config, args).await,
        Command::Link(args) => run_link(&config, args),
        Command::Manage(args) => run_manage(&config, args).await,
    };

    let value = match outcome {
        Ok(value) => value,
        Err(e) => {
            if let Some(usage) = e.downcast_ref::<UsageError>() {
                Cli::command()
                    .error(ErrorKind::MissingRequiredArgument, usage.to_string())
                    .exit();
            }
            error!("{:#}", e);
            json!({"success": false, "error": format!("{:#}", e)})
        }
    };

    println!("{}", serde_json::to_string_pretty(&value)?);
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(config: VolumeConfig, args: &ServeArgs) -> Result<()> {
    info!("Starting comfy-volume server");

    if args.no_link {
        info!("Skipping startup linking");
    } else {
        let layout = VolumeLayout::from_config(&config);
        let report = tokio::task::spawn_blocking(move || link_volume(&layout)).await??;
        info!(
            "Startup linking: {} new links, {} failed",
            report.linked_count(),
            report.failed_count()
        );
    }

    let state = Arc::new(AppState::from_config(config)?);

    for check in state.nodes.verify().iter().filter(|v| !v.valid) {
        warn!(
            "Custom node {} may fail to import: {}",
            check.name,
            check.reason.as_deref().unwrap_or("unknown")
        );
    }
    if state.config.install_node_requirements {
        let outcomes = state.nodes.install_linked_requirements().await?;
        let failed = outcomes.iter().filter(|o| !o.success).count();
        info!(
            "Installed requirements for {} nodes ({} failed)",
            outcomes.len(),
            failed
        );
    }

    let (addr, mut server) = start_server(state.clone(), &args.host, args.port).await?;

    // Machine-readable line for supervisors and tests
    println!("COMFY_VOLUME_PORT={}", addr.port());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            state.request_shutdown();
            (&mut server).await?;
        }
        result = &mut server => {
            result?;
        }
    }

    if state.is_draining() {
        warn!("Server drained after an upstream failure");
    }
    info!("Shutting down");
    Ok(())
}
