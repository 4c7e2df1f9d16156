//! Static serving of generated artifact files.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::error::AppError;
use crate::state::AppState;

/// Public prefix of every generated file.
pub const UPLOAD_PREFIX: &str = "/uploads/digital-assets";

pub fn router() -> Router<AppState> {
    Router::new().route("/uploads/digital-assets/{file}", get(serve_upload))
}

/// Host-relative URL for a stored file name.
pub fn upload_url(file: &str) -> String {
    format!("{}/{}", UPLOAD_PREFIX, file)
}

/// GET /uploads/digital-assets/{file}
///
/// Query strings (cache-busting `t=`) are ignored.
async fn serve_upload(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, AppError> {
    let upload = state
        .upload(&file)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No such file: {}", file)))?;
    Ok((
        [
            (header::CONTENT_TYPE, upload.content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        upload.bytes,
    )
        .into_response())
}
