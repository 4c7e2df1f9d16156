//! API routes for the development server.

pub mod assets;
pub mod digital_assets;
pub mod uploads;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Creates the main router: REST endpoints under `/api`, generated files
/// under `/uploads/digital-assets`.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .merge(uploads::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/assets", assets::router())
        .nest("/digital-assets", digital_assets::router())
}
