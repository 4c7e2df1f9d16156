//! AssetLink development server.
//!
//! An in-memory stand-in for the asset backend: asset lookup, digital-asset
//! generation and static serving of the generated files, with bearer-token
//! checks. State lives for the life of the process.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::DevServerConfig;
pub use error::AppError;
pub use routes::create_router;
pub use state::AppState;

use tokio::net::TcpListener;

/// Serves the API on an already-bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    axum::serve(listener, create_router(state)).await
}
