use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{Duration, Utc};

use slither_db::SubmitOutcome;
use slither_db::leaderboard::percentile;
use slither_db::models::RankedEntryRow;
use slither_types::api::{
    Claims, LeaderboardEntry, LeaderboardQuery, LeaderboardResponse, PurchaseStatus,
    SubmitScoreRequest, SubmitScoreResponse,
};
use slither_types::models::{LeaderboardPeriod, ParseEnumError};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::optional_claims;
use crate::{ok, with_db};

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 500;
/// Without a pass, rankings are presented as an hour old.
const FREE_TIER_DELAY_HOURS: i64 = 1;

pub async fn submit_score(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Result<Json<SubmitScoreRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    if req.completion_time < 0 {
        return Err(ApiError::Validation("completionTime cannot be negative".into()));
    }
    if req.error_count < 0 {
        return Err(ApiError::Validation("errorCount cannot be negative".into()));
    }

    let user_id = claims.sub;
    let outcome = with_db(&state, move |db| {
        db.submit_score(
            user_id,
            req.puzzle_id,
            req.completion_time,
            req.error_count,
            Utc::now(),
        )
    })
    .await?;

    match outcome {
        SubmitOutcome::Recorded { score } => Ok((
            StatusCode::CREATED,
            ok(SubmitScoreResponse {
                message: "Score submitted successfully".to_string(),
                score,
            }),
        )),
        SubmitOutcome::PassRequired => Err(ApiError::PassRequired),
        SubmitOutcome::PuzzleNotFound => Err(ApiError::PuzzleNotFound),
    }
}

pub async fn get_leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    period: Result<Path<String>, PathRejection>,
    query: Result<Query<LeaderboardQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = period?;
    let Query(query) = query?;

    let period: LeaderboardPeriod = raw
        .parse()
        .map_err(|e: ParseEnumError| ApiError::Validation(e.to_string()))?;

    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "Limit must be between 1 and {}",
            MAX_LIMIT
        )));
    }

    let user_id = optional_claims(&state, &headers).map(|c| c.sub);
    let now = Utc::now();

    let (top, user_entry, has_pass) = with_db(&state, move |db| {
        let (top, user_entry) = db.leaderboard(period, now, user_id, limit)?;
        let has_pass = match user_id {
            Some(uid) => db.has_leaderboard_access(uid)?,
            None => false,
        };
        Ok((top, user_entry, has_pass))
    })
    .await?;

    let last_updated = if has_pass {
        now
    } else {
        now - Duration::hours(FREE_TIER_DELAY_HOURS)
    };

    Ok(ok(LeaderboardResponse {
        entries: top.into_iter().map(to_api).collect(),
        user_entry: user_entry.map(to_api),
        last_updated,
        period,
    }))
}

pub async fn user_stats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let stats = with_db(&state, move |db| db.user_ranking_stats(user_id, Utc::now())).await?;
    Ok(ok(stats))
}

pub async fn purchase_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let has_pass = with_db(&state, move |db| db.has_leaderboard_access(user_id)).await?;

    Ok(ok(PurchaseStatus {
        has_leaderboard_pass: has_pass,
        can_submit_scores: has_pass,
        can_view_real_time_rankings: has_pass,
    }))
}

fn to_api(row: RankedEntryRow) -> LeaderboardEntry {
    LeaderboardEntry {
        percentile: percentile(row.rank, row.total_participants),
        id: row.id,
        user_id: row.user_id,
        user_name: row.user_name,
        puzzle_id: row.puzzle_id,
        score: row.score,
        completion_time: row.completion_time,
        error_count: row.error_count,
        submitted_at: row.submitted_at,
        difficulty: row.difficulty,
        grid_size: row.grid_size,
        rank: row.rank,
        total_participants: row.total_participants,
    }
}
