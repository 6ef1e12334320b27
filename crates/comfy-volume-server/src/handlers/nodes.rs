//! Custom node listing handler.

use super::{blocking, ApiResult};
use crate::server::AppState;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Cached nodes plus the import check of each runtime entry.
pub async fn handle_list_nodes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let nodes = state.nodes.clone();
    let body = blocking(move || {
        let installed = nodes.list()?;
        let verification = nodes.verify();
        Ok(json!({
            "nodes": installed,
            "verification": verification,
        }))
    })
    .await?;
    Ok(Json(body))
}
