use axum::{
    Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    response::IntoResponse,
};
use chrono::{NaiveDate, Utc};
use tracing::info;

use slither_db::AssignOutcome;
use slither_db::models::{DailyChallengeRow, PuzzleRow};
use slither_types::api::GenerateRequest;
use slither_types::models::DailyChallenge;
use slither_types::schedule::slot_for_date;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::{ok, with_db};

const MAX_GENERATE_DAYS: u32 = 30;

pub async fn today(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let today = Utc::now().date_naive();
    let challenge = load_challenge(&state, today).await?;
    Ok(ok(challenge))
}

pub async fn by_date(
    State(state): State<AppState>,
    date: Result<Path<String>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(raw) = date?;
    let date = NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        ApiError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
    })?;

    let challenge = load_challenge(&state, date).await?;
    Ok(ok(challenge))
}

pub async fn admin_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let today = Utc::now().date_naive();
    let stats = with_db(&state, move |db| db.daily_challenge_stats(today)).await?;
    Ok(ok(stats))
}

pub async fn admin_generate(
    State(state): State<AppState>,
    body: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    if !(1..=MAX_GENERATE_DAYS).contains(&req.days) {
        return Err(ApiError::Validation(format!(
            "Days must be between 1 and {}",
            MAX_GENERATE_DAYS
        )));
    }

    let days = req.days;
    let summary = with_db(&state, move |db| {
        let now = Utc::now();
        db.pregenerate_daily_challenges(now.date_naive(), days, now)
    })
    .await?;

    info!(
        "Admin pre-generation: {} generated, {} failed",
        summary.generated, summary.failed
    );
    Ok(ok(summary))
}

pub async fn admin_check_stock(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = with_db(&state, |db| {
        let now = Utc::now();
        db.replenish_daily_challenges(now.date_naive(), now)
    })
    .await?;
    Ok(ok(summary))
}

/// Today's challenge is assigned on first request; other dates are only
/// looked up.
async fn load_challenge(state: &AppState, date: NaiveDate) -> Result<DailyChallenge, ApiError> {
    let found = with_db(state, move |db| {
        if let Some(found) = db.get_daily_challenge(date)? {
            return Ok(Some(found));
        }

        let now = Utc::now();
        if date != now.date_naive() {
            return Ok(None);
        }

        match db.assign_daily_challenge(date, now)? {
            AssignOutcome::NoPuzzle(_) => Ok(None),
            AssignOutcome::Assigned { challenge, puzzle } => Ok(Some((challenge, puzzle))),
            AssignOutcome::Existing(_) => db.get_daily_challenge(date),
        }
    })
    .await?
    .ok_or(ApiError::ChallengeUnavailable(date))?;

    Ok(to_api(found))
}

fn to_api((challenge, puzzle): (DailyChallengeRow, PuzzleRow)) -> DailyChallenge {
    let slot = slot_for_date(challenge.challenge_date);
    DailyChallenge {
        challenge_date: challenge.challenge_date,
        puzzle_id: challenge.puzzle_id,
        difficulty: challenge.difficulty,
        grid_size: puzzle.grid_size,
        display_name: slot.display_name.to_string(),
        puzzle: puzzle.to_api(),
    }
}
