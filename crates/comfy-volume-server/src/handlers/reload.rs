//! Hot reload endpoint.

use super::ApiResult;
use crate::server::AppState;
use axum::{extract::State, Json};
use comfy_volume_core::ReloadResponse;
use std::sync::Arc;
use tracing::info;

/// `POST /reload`: refresh the volume and link anything new.
pub async fn handle_reload(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReloadResponse>> {
    let response = state.reloader.reload().await?;
    info!("{}", response.message);
    Ok(Json(response))
}
