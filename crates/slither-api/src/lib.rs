pub mod auth;
pub mod daily;
pub mod error;
pub mod leaderboard;
pub mod middleware;
pub mod puzzles;
pub mod rate_limit;
pub mod routes;

use axum::Json;
use serde::Serialize;
use slither_db::Database;
use slither_types::api::ApiResponse;
use tracing::error;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;

/// Run blocking database work off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("database task failed"))
        })?
        .map_err(ApiError::from)
}

pub(crate) fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data))
}
