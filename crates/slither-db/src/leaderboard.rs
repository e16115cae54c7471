use anyhow::Result;
use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rusqlite::Connection;
use slither_types::api::{RankingStats, UserRankingStats};
use slither_types::models::{Difficulty, LeaderboardPeriod};
use tracing::info;

use crate::models::RankedEntryRow;
use crate::{Database, OptionalExt, enum_column};

/// Floor for any accepted submission.
const MIN_SCORE: i64 = 100;
const ERROR_PENALTY: i64 = 50;
/// Points lost for taking exactly the estimated time.
const TIME_PENALTY_AT_ESTIMATE: f64 = 200.0;

#[derive(Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Recorded { score: i64 },
    PassRequired,
    PuzzleNotFound,
}

/// Score for a finished puzzle: a per-difficulty base, minus time measured
/// against the expected solve time, minus a flat cost per mistake.
pub fn calculate_score(difficulty: Difficulty, completion_secs: i64, error_count: i64) -> i64 {
    let (base, estimated_secs): (i64, i64) = match difficulty {
        Difficulty::Easy => (1000, 5 * 60),
        Difficulty::Medium => (1500, 8 * 60),
        Difficulty::Difficult => (2000, 12 * 60),
    };

    let time_penalty =
        (completion_secs as f64 / estimated_secs as f64 * TIME_PENALTY_AT_ESTIMATE).floor() as i64;
    let error_penalty = error_count.saturating_mul(ERROR_PENALTY);

    base.saturating_sub(time_penalty)
        .saturating_sub(error_penalty)
        .max(MIN_SCORE)
}

/// Inclusive lower bound of a period, or `None` for all time. Weeks start on
/// Sunday, matching the daily schedule.
pub fn period_start(period: LeaderboardPeriod, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    let start: NaiveDate = match period {
        LeaderboardPeriod::Daily => today,
        LeaderboardPeriod::Weekly => {
            today - Days::new(u64::from(today.weekday().num_days_from_sunday()))
        }
        LeaderboardPeriod::Monthly => today.with_day(1)?,
        LeaderboardPeriod::Total => return None,
    };
    Some(start.and_hms_opt(0, 0, 0)?.and_utc())
}

pub fn percentile(rank: u64, total: u64) -> u32 {
    let total = total.max(1) as f64;
    ((1.0 - (rank.saturating_sub(1)) as f64 / total) * 100.0).round() as u32
}

const RANKED_CTE: &str = "WITH ranked AS (
         SELECT le.*,
                ROW_NUMBER() OVER (ORDER BY le.score DESC, le.submitted_at ASC, le.id ASC) AS rank,
                COUNT(*) OVER () AS total_participants
         FROM leaderboard_entries le
         WHERE (?1 IS NULL OR le.submitted_at >= ?1)
     )";

const RANKED_COLUMNS: &str = "id, user_id, user_name, puzzle_id, score, completion_time, error_count,
     difficulty, grid_size, submitted_at, rank, total_participants";

impl Database {
    /// Record a finished game. Only users holding leaderboard access may
    /// submit.
    pub fn submit_score(
        &self,
        user_id: i64,
        puzzle_id: i64,
        completion_secs: i64,
        error_count: i64,
        now: DateTime<Utc>,
    ) -> Result<SubmitOutcome> {
        if !self.has_leaderboard_access(user_id)? {
            return Ok(SubmitOutcome::PassRequired);
        }

        self.with_conn(|conn| {
            let puzzle: Option<(u32, Difficulty)> = conn
                .query_row(
                    "SELECT grid_size, difficulty FROM puzzles WHERE id = ?1",
                    [puzzle_id],
                    |row| Ok((row.get(0)?, enum_column(row, 1)?)),
                )
                .optional()?;
            let Some((grid_size, difficulty)) = puzzle else {
                return Ok(SubmitOutcome::PuzzleNotFound);
            };

            let user_name: String = conn
                .query_row(
                    "SELECT COALESCE(display_name, username) FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or_else(|| "Anonymous".to_string());

            let score = calculate_score(difficulty, completion_secs, error_count);

            conn.execute(
                "INSERT INTO leaderboard_entries
                    (user_id, user_name, puzzle_id, score, completion_time, error_count,
                     difficulty, grid_size, submitted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    user_id,
                    user_name,
                    puzzle_id,
                    score,
                    completion_secs,
                    error_count,
                    difficulty.as_str(),
                    grid_size,
                    now
                ],
            )?;

            info!("User {} scored {} on puzzle {}", user_id, score, puzzle_id);
            Ok(SubmitOutcome::Recorded { score })
        })
    }

    /// Top `limit` entries for the period, plus the caller's best entry when
    /// it falls outside the top.
    pub fn leaderboard(
        &self,
        period: LeaderboardPeriod,
        now: DateTime<Utc>,
        user_id: Option<i64>,
        limit: u32,
    ) -> Result<(Vec<RankedEntryRow>, Option<RankedEntryRow>)> {
        let since = period_start(period, now);

        self.with_conn(|conn| {
            let sql = format!(
                "{} SELECT {} FROM ranked WHERE rank <= ?2 ORDER BY rank",
                RANKED_CTE, RANKED_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let top = stmt
                .query_map(rusqlite::params![since, limit], map_ranked)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let user_entry = match user_id {
                Some(uid) if !top.iter().any(|e| e.user_id == uid) => {
                    query_user_best(conn, since, uid)?
                }
                _ => None,
            };

            Ok((top, user_entry))
        })
    }

    pub fn user_ranking_stats(&self, user_id: i64, now: DateTime<Utc>) -> Result<UserRankingStats> {
        let mut stats = UserRankingStats::default();

        self.with_conn(|conn| {
            for period in LeaderboardPeriod::ALL {
                let best = query_user_best(conn, period_start(period, now), user_id)?.map(|e| {
                    RankingStats {
                        rank: e.rank,
                        total_participants: e.total_participants,
                        percentile: percentile(e.rank, e.total_participants),
                    }
                });

                match period {
                    LeaderboardPeriod::Daily => stats.daily = best,
                    LeaderboardPeriod::Weekly => stats.weekly = best,
                    LeaderboardPeriod::Monthly => stats.monthly = best,
                    LeaderboardPeriod::Total => stats.total = best,
                }
            }
            Ok(())
        })?;

        Ok(stats)
    }
}

fn query_user_best(
    conn: &Connection,
    since: Option<DateTime<Utc>>,
    user_id: i64,
) -> Result<Option<RankedEntryRow>> {
    let sql = format!(
        "{} SELECT {} FROM ranked WHERE user_id = ?2 ORDER BY rank LIMIT 1",
        RANKED_CTE, RANKED_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![since, user_id], map_ranked)
        .optional()
}

fn map_ranked(row: &rusqlite::Row<'_>) -> rusqlite::Result<RankedEntryRow> {
    Ok(RankedEntryRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        puzzle_id: row.get(3)?,
        score: row.get(4)?,
        completion_time: row.get(5)?,
        error_count: row.get(6)?,
        difficulty: enum_column(row, 7)?,
        grid_size: row.get(8)?,
        submitted_at: row.get(9)?,
        rank: row.get::<_, i64>(10)? as u64,
        total_participants: row.get::<_, i64>(11)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzles::tests::seed_puzzle;
    use chrono::{Duration, TimeZone};
    use slither_types::models::UsageType;

    fn paid_user(db: &Database, name: &str) -> i64 {
        let user = db
            .create_user(&format!("{}@example.com", name), name, "hash", None, Utc::now())
            .unwrap();
        db.grant_leaderboard_access(user.id, Utc::now()).unwrap();
        user.id
    }

    #[test]
    fn score_formula() {
        // 2.5 minutes on easy: 1000 - 100
        assert_eq!(calculate_score(Difficulty::Easy, 150, 0), 900);
        // 12 minutes on difficult with 2 errors: 2000 - 200 - 100
        assert_eq!(calculate_score(Difficulty::Difficult, 720, 2), 1700);
        // Never below the floor
        assert_eq!(calculate_score(Difficulty::Medium, 100_000, 50), MIN_SCORE);
    }

    #[test]
    fn score_floor_holds_for_extreme_inputs() {
        assert_eq!(calculate_score(Difficulty::Easy, 60, 368_934_881_474_191_013), MIN_SCORE);
        assert_eq!(calculate_score(Difficulty::Difficult, 0, i64::MAX), MIN_SCORE);
        assert_eq!(calculate_score(Difficulty::Medium, i64::MAX, 0), MIN_SCORE);
    }

    #[test]
    fn period_bounds() {
        // Wednesday 2026-10-14 15:30 UTC
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 15, 30, 0).unwrap();
        assert_eq!(
            period_start(LeaderboardPeriod::Daily, now),
            Some(Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(
            period_start(LeaderboardPeriod::Weekly, now),
            Some(Utc.with_ymd_and_hms(2026, 10, 11, 0, 0, 0).unwrap())
        );
        assert_eq!(
            period_start(LeaderboardPeriod::Monthly, now),
            Some(Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(period_start(LeaderboardPeriod::Total, now), None);
    }

    #[test]
    fn percentile_of_rank() {
        assert_eq!(percentile(1, 4), 100);
        assert_eq!(percentile(2, 4), 75);
        assert_eq!(percentile(4, 4), 25);
        assert_eq!(percentile(1, 0), 100);
    }

    #[test]
    fn submit_requires_pass_and_puzzle() {
        let db = Database::open_in_memory().unwrap();
        let puzzle = seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);
        let free = db
            .create_user("free@example.com", "free", "hash", None, Utc::now())
            .unwrap();

        assert_eq!(
            db.submit_score(free.id, puzzle, 100, 0, Utc::now()).unwrap(),
            SubmitOutcome::PassRequired
        );

        let paid = paid_user(&db, "paid");
        assert_eq!(
            db.submit_score(paid, 9999, 100, 0, Utc::now()).unwrap(),
            SubmitOutcome::PuzzleNotFound
        );
        assert_eq!(
            db.submit_score(paid, puzzle, 150, 0, Utc::now()).unwrap(),
            SubmitOutcome::Recorded { score: 900 }
        );
    }

    #[test]
    fn ranking_orders_by_score_then_time() {
        let db = Database::open_in_memory().unwrap();
        let puzzle = seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);
        let alice = paid_user(&db, "alice");
        let bob = paid_user(&db, "bob");
        let carol = paid_user(&db, "carol");
        let now = Utc::now();

        db.submit_score(bob, puzzle, 150, 0, now - Duration::seconds(30)).unwrap();
        db.submit_score(alice, puzzle, 150, 0, now - Duration::seconds(10)).unwrap();
        db.submit_score(carol, puzzle, 300, 3, now - Duration::seconds(5)).unwrap();

        let (top, user_entry) = db
            .leaderboard(LeaderboardPeriod::Total, now, Some(carol), 2)
            .unwrap();
        assert_eq!(top.len(), 2);
        // Equal scores: earlier submission ranks first
        assert_eq!(top[0].user_id, bob);
        assert_eq!(top[1].user_id, alice);
        assert_eq!(top[0].total_participants, 3);

        let carol_entry = user_entry.unwrap();
        assert_eq!(carol_entry.rank, 3);
        assert_eq!(carol_entry.user_name, "carol");

        let stats = db.user_ranking_stats(alice, now).unwrap();
        let total = stats.total.unwrap();
        assert_eq!(total.rank, 2);
        assert_eq!(total.percentile, 67);
    }

    #[test]
    fn daily_board_excludes_older_entries() {
        let db = Database::open_in_memory().unwrap();
        let puzzle = seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);
        let alice = paid_user(&db, "alice");
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap();

        db.submit_score(alice, puzzle, 150, 0, now - Duration::days(2)).unwrap();
        let (daily, _) = db.leaderboard(LeaderboardPeriod::Daily, now, None, 10).unwrap();
        assert!(daily.is_empty());

        let (total, _) = db.leaderboard(LeaderboardPeriod::Total, now, None, 10).unwrap();
        assert_eq!(total.len(), 1);

        let stats = db.user_ranking_stats(alice, now).unwrap();
        assert!(stats.daily.is_none());
        assert!(stats.total.is_some());
    }
}
