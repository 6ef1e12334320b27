//! HTTP server implementation using Axum.

use crate::handlers::{
    handle_api, handle_health, handle_list_models, handle_list_nodes, handle_raw, handle_reload,
};
use crate::upstream::UpstreamClient;
use axum::{
    routing::{any, get, post},
    Router,
};
use comfy_volume_core::volume::refresher_from_config;
use comfy_volume_core::workflow::WorkflowBindings;
use comfy_volume_core::{ModelStore, VolumeConfig, VolumeLayout, VolumeReloader};
use comfy_volume_nodes::CustomNodesManager;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Application state shared across handlers.
pub struct AppState {
    pub config: VolumeConfig,
    pub layout: VolumeLayout,
    pub reloader: VolumeReloader,
    pub store: ModelStore,
    pub nodes: CustomNodesManager,
    pub upstream: UpstreamClient,
    pub bindings: WorkflowBindings,
    pub workflow_path: PathBuf,
    draining: AtomicBool,
    shutdown: Arc<Notify>,
}

impl AppState {
    pub fn from_config(config: VolumeConfig) -> comfy_volume_core::Result<Self> {
        let layout = VolumeLayout::from_config(&config);
        let reloader = VolumeReloader::new(layout.clone(), refresher_from_config(&config)?);
        let store = ModelStore::from_config(&config)?;
        let nodes = CustomNodesManager::from_config(&config);
        let upstream = UpstreamClient::new(&config.upstream_url)?;
        let bindings = WorkflowBindings {
            prompt_node: config.prompt_node.clone(),
            save_node: config.save_node.clone(),
        };
        let workflow_path = config.workflow_path.clone();

        Ok(Self {
            config,
            layout,
            reloader,
            store,
            nodes,
            upstream,
            bindings,
            workflow_path,
            draining: AtomicBool::new(false),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Stop taking requests and shut the server down once in-flight ones finish.
    pub fn begin_drain(&self) {
        if !self.draining.swap(true, Ordering::SeqCst) {
            warn!("Entering drain mode");
            self.request_shutdown();
        }
    }

    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/reload", post(handle_reload))
        .route("/models", get(handle_list_models))
        .route("/nodes", get(handle_list_nodes))
        .route("/api", post(handle_api))
        .route("/api/raw/*path", any(handle_raw))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the bound address (useful when port=0) and the serving task, which
/// completes after a graceful shutdown.
pub async fn start_server(
    state: Arc<AppState>,
    host: &str,
    port: u16,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)> {
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.notified().await })
            .await;
        match result {
            Ok(()) => info!("Server stopped"),
            Err(e) => error!("Server error: {}", e),
        }
    });

    Ok((actual_addr, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_state(tmp: &TempDir) -> Arc<AppState> {
        let config = VolumeConfig {
            cache_root: tmp.path().join("cache"),
            runtime_root: tmp.path().join("runtime"),
            upstream_url: "http://127.0.0.1:9".to_string(),
            workflow_path: tmp.path().join("workflow.json"),
            ..VolumeConfig::default()
        };
        Arc::new(AppState::from_config(config).unwrap())
    }

    #[tokio::test]
    async fn test_health_and_drain_shutdown() {
        let tmp = TempDir::new().unwrap();
        let state = test_state(&tmp);
        let (addr, handle) = start_server(state.clone(), "127.0.0.1", 0).await.unwrap();

        let url = format!("http://{}/health", addr);
        let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
        assert_eq!(body["status"], "ok");

        state.begin_drain();
        assert!(state.is_draining());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop after drain")
            .unwrap();
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let tmp = TempDir::new().unwrap();
        let (addr, _handle) = start_server(test_state(&tmp), "127.0.0.1", 0).await.unwrap();

        let response = reqwest::get(format!("http://{}/nope", addr)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    }
}
