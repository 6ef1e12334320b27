//! Model listing handler.

use super::{blocking, ApiResult};
use crate::server::AppState;
use axum::{extract::State, Json};
use comfy_volume_core::models::ModelListing;
use std::sync::Arc;

pub async fn handle_list_models(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ModelListing>> {
    let store = state.store.clone();
    let listing = blocking(move || Ok(store.list_models())).await?;
    Ok(Json(listing))
}
