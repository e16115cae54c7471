use axum::{
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::debug;

use slither_types::api::PuzzleQuery;
use slither_types::models::{MAX_GRID_SIZE, MIN_GRID_SIZE, UsageType};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::optional_claims;
use crate::{ok, with_db};

/// Hand out a fresh regular-play puzzle. The puzzle is consumed by this
/// call and will not be served again.
pub async fn get_puzzle(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<PuzzleQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;

    if query
        .size
        .is_some_and(|size| !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&size))
    {
        return Err(ApiError::Validation(format!(
            "Grid size must be between {} and {}",
            MIN_GRID_SIZE, MAX_GRID_SIZE
        )));
    }

    let user_id = optional_claims(&state, &headers).map(|c| c.sub);
    let difficulty = query.difficulty;
    let size = query.size;

    let puzzle = with_db(&state, move |db| {
        // A token can outlive its account; such callers play anonymously.
        let user_id = match user_id {
            Some(id) if db.get_user_by_id(id)?.is_some_and(|u| u.is_active) => Some(id),
            _ => None,
        };
        db.reserve_puzzle(difficulty, UsageType::Regular, size, user_id, Utc::now())
    })
    .await?
    .ok_or(ApiError::NoPuzzlesAvailable(difficulty))?;

    debug!("Serving puzzle {} ({})", puzzle.id, puzzle.difficulty);
    Ok(ok(puzzle.to_api()))
}

pub async fn stock_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stock = with_db(&state, |db| db.stock_levels()).await?;
    Ok(ok(stock))
}

/// Admin lookup. Does not consume the puzzle.
pub async fn get_puzzle_by_id(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(id) = id?;

    let puzzle = with_db(&state, move |db| db.get_puzzle(id))
        .await?
        .ok_or(ApiError::PuzzleNotFound)?;

    Ok(ok(puzzle.to_api()))
}
