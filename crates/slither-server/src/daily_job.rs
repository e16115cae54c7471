use std::time::Duration;

use chrono::Utc;
use slither_api::AppState;
use slither_db::AssignOutcome;
use tracing::{debug, info, warn};

/// Background task that keeps the daily schedule stocked.
///
/// Every tick it tops up the upcoming schedule when it runs low, then makes
/// sure today has a challenge. The first tick fires immediately.
pub async fn run_daily_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let state = state.clone();
        let result = tokio::task::spawn_blocking(move || {
            let now = Utc::now();
            let today = now.date_naive();
            let replenish = state.db.replenish_daily_challenges(today, now)?;
            let outcome = state.db.assign_daily_challenge(today, now)?;
            anyhow::Ok((replenish, outcome))
        })
        .await;

        match result {
            Ok(Ok((replenish, outcome))) => {
                if replenish.needed {
                    info!(
                        "Daily job: replenished schedule, {} generated, {} failed",
                        replenish.generated, replenish.failed
                    );
                }
                match outcome {
                    AssignOutcome::Assigned { challenge, .. } => info!(
                        "Daily job: assigned puzzle {} for {}",
                        challenge.puzzle_id, challenge.challenge_date
                    ),
                    AssignOutcome::Existing(challenge) => debug!(
                        "Daily job: {} already has puzzle {}",
                        challenge.challenge_date, challenge.puzzle_id
                    ),
                    AssignOutcome::NoPuzzle(slot) => warn!(
                        "Daily job: no {}x{} {} puzzle left for today",
                        slot.grid_size, slot.grid_size, slot.difficulty
                    ),
                }
            }
            Ok(Err(e)) => warn!("Daily job error: {:#}", e),
            Err(e) => warn!("Daily job task failed: {}", e),
        }
    }
}
