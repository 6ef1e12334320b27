//! Inference façade: per-request workflow submission and raw forwarding.

use super::{blocking, ApiError, ApiResult};
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    Json,
};
use comfy_volume_core::workflow::{load_workflow, prepare_workflow};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

fn draining_error() -> ApiError {
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "Server is draining and no longer accepts requests",
    )
}

/// `POST /api`: run the workflow template with the given prompt.
pub async fn handle_api(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Value>,
) -> ApiResult<Json<Value>> {
    if state.is_draining() {
        return Err(draining_error());
    }

    let prompt = request
        .get("prompt")
        .and_then(Value::as_str)
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::new(StatusCode::BAD_REQUEST, "Missing required field: prompt"))?
        .to_string();

    let workflow_path = state.workflow_path.clone();
    let mut workflow = blocking(move || load_workflow(&workflow_path)).await?;

    let client_id = uuid::Uuid::new_v4().simple().to_string();
    prepare_workflow(&mut workflow, &state.bindings, &prompt, &client_id)?;

    if let Err(e) = state.upstream.check_health().await {
        error!("Upstream health check failed, draining: {}", e);
        state.begin_drain();
        return Err(ApiError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()));
    }

    let upstream_response = state.upstream.submit_prompt(workflow, &client_id).await?;
    info!("Queued prompt for client {}", client_id);

    let body = match upstream_response {
        Value::Object(mut map) => {
            map.insert("client_id".to_string(), Value::String(client_id));
            Value::Object(map)
        }
        other => json!({"response": other, "client_id": client_id}),
    };
    Ok(Json(body))
}

/// `ANY /api/raw/*path`: pass the request through to the engine.
pub async fn handle_raw(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    if state.is_draining() {
        return Err(draining_error());
    }

    let payload = if body.is_empty() {
        None
    } else {
        let value: Value = serde_json::from_slice(&body).map_err(|e| {
            ApiError::new(StatusCode::BAD_REQUEST, format!("Invalid JSON body: {}", e))
        })?;
        Some(value)
    };

    let (status, response) = state
        .upstream
        .forward(method, &path, query.as_deref(), payload)
        .await?;
    if !status.is_success() {
        warn!("Upstream returned {} for /{}", status, path);
    }
    Ok((status, Json(response)))
}
