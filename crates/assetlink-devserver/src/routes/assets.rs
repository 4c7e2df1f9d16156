//! Asset lookup endpoints.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::{Access, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assets))
        .route("/{id}", get(get_asset))
}

/// GET /api/assets
async fn list_assets(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    state.authorize(&headers, Access::Read)?;
    let assets = state.assets().await;
    Ok(Json(json!({ "success": true, "assets": assets })))
}

/// GET /api/assets/{id}
///
/// Accepts either the internal id or the tag.
async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    state.authorize(&headers, Access::Read)?;
    let asset = state
        .find_asset(&id)
        .await
        .ok_or_else(|| AppError::NotFound("Asset not found".to_string()))?;
    tracing::debug!(id = %id, "asset lookup");
    Ok(Json(json!({ "asset": asset })))
}
