//! Daily challenge assignment.
//!
//! Each calendar date gets at most one challenge, drawn from the `daily`
//! pool according to the weekly schedule. Assignment, the puzzle's
//! consumption mark and the usage log entry commit together or not at all.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, Days, NaiveDate, Utc};
use rusqlite::{Connection, TransactionBehavior};
use slither_types::api::{
    DailyChallengeStats, PregenerateItem, PregenerateSummary, RecentChallenge, ReplenishSummary,
};
use slither_types::models::{Difficulty, UsageType};
use slither_types::schedule::{DailySlot, slot_for_date};
use tracing::{info, warn};

use crate::models::{DailyChallengeRow, PuzzleRow};
use crate::puzzles::{CONTEXT_DAILY_CHALLENGE, log_usage, query_puzzle};
use crate::{Database, OptionalExt, enum_column};

/// Fewer upcoming challenges than this triggers a refill.
const UPCOMING_LOW_WATER: u64 = 5;
/// How far ahead "upcoming" looks, in days.
const UPCOMING_WINDOW_DAYS: u64 = 7;
/// Days scheduled by a refill.
const REPLENISH_DAYS: u32 = 14;

#[derive(Debug)]
pub enum AssignOutcome {
    /// The date already had a challenge; nothing was written.
    Existing(DailyChallengeRow),
    Assigned {
        challenge: DailyChallengeRow,
        puzzle: PuzzleRow,
    },
    /// Inventory for the day's slot is exhausted; nothing was written.
    NoPuzzle(DailySlot),
}

impl AssignOutcome {
    pub fn puzzle_id(&self) -> Option<i64> {
        match self {
            Self::Existing(challenge) => Some(challenge.puzzle_id),
            Self::Assigned { challenge, .. } => Some(challenge.puzzle_id),
            Self::NoPuzzle(_) => None,
        }
    }
}

impl Database {
    /// Ensure `date` has a daily challenge. Safe to call repeatedly and
    /// from several processes at once.
    pub fn assign_daily_challenge(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<AssignOutcome> {
        let slot = slot_for_date(date);

        self.with_conn_mut(|conn| {
            // IMMEDIATE takes the write lock up front so the existence check
            // and the inserts below see the same snapshot.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = query_challenge(&tx, date)? {
                info!(
                    "Daily challenge for {} already exists: puzzle {}",
                    date, existing.puzzle_id
                );
                return Ok(AssignOutcome::Existing(existing));
            }

            let candidate: Option<i64> = tx
                .query_row(
                    "SELECT id FROM puzzles
                     WHERE usage_type = ?1 AND difficulty = ?2 AND grid_size = ?3 AND used_at IS NULL
                     ORDER BY id
                     LIMIT 1",
                    rusqlite::params![
                        UsageType::Daily.as_str(),
                        slot.difficulty.as_str(),
                        slot.grid_size
                    ],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(puzzle_id) = candidate else {
                warn!(
                    "No suitable puzzle found for daily challenge {}: need {}x{} {} (daily pool exhausted)",
                    date, slot.grid_size, slot.grid_size, slot.difficulty
                );
                return Ok(AssignOutcome::NoPuzzle(slot));
            };

            tx.execute(
                "INSERT INTO daily_challenges (challenge_date, puzzle_id, difficulty, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![date, puzzle_id, slot.difficulty.as_str(), now],
            )?;

            let marked = tx.execute(
                "UPDATE puzzles SET used_at = ?1, used_count = used_count + 1
                 WHERE id = ?2 AND used_at IS NULL",
                rusqlite::params![now, puzzle_id],
            )?;
            if marked != 1 {
                bail!("Puzzle {} was consumed while assigning {}", puzzle_id, date);
            }

            log_usage(&tx, puzzle_id, None, CONTEXT_DAILY_CHALLENGE, now)?;

            let challenge = query_challenge(&tx, date)?
                .ok_or_else(|| anyhow!("Daily challenge {} vanished after insert", date))?;
            let puzzle = query_puzzle(&tx, puzzle_id)?
                .ok_or_else(|| anyhow!("Puzzle {} vanished during assignment", puzzle_id))?;

            tx.commit()?;

            info!(
                "Assigned daily challenge {}: puzzle {} ({}x{} {})",
                date, puzzle_id, slot.grid_size, slot.grid_size, slot.difficulty
            );
            Ok(AssignOutcome::Assigned { challenge, puzzle })
        })
    }

    pub fn get_daily_challenge(
        &self,
        date: NaiveDate,
    ) -> Result<Option<(DailyChallengeRow, PuzzleRow)>> {
        self.with_conn(|conn| {
            let Some(challenge) = query_challenge(conn, date)? else {
                return Ok(None);
            };
            let puzzle = query_puzzle(conn, challenge.puzzle_id)?.ok_or_else(|| {
                anyhow!(
                    "Daily challenge {} references missing puzzle {}",
                    date,
                    challenge.puzzle_id
                )
            })?;
            Ok(Some((challenge, puzzle)))
        })
    }

    pub fn daily_challenge_stats(&self, today: NaiveDate) -> Result<DailyChallengeStats> {
        let horizon = today + Days::new(UPCOMING_WINDOW_DAYS);
        let since = today - Days::new(UPCOMING_WINDOW_DAYS);

        self.with_conn(|conn| {
            let total: i64 =
                conn.query_row("SELECT COUNT(*) FROM daily_challenges", [], |row| row.get(0))?;

            let upcoming: i64 = conn.query_row(
                "SELECT COUNT(*) FROM daily_challenges
                 WHERE challenge_date > ?1 AND challenge_date <= ?2",
                rusqlite::params![today, horizon],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT dc.challenge_date, dc.puzzle_id, p.grid_size, p.difficulty
                 FROM daily_challenges dc
                 JOIN puzzles p ON dc.puzzle_id = p.id
                 WHERE dc.challenge_date >= ?1
                 ORDER BY dc.challenge_date DESC
                 LIMIT 7",
            )?;
            let recent = stmt
                .query_map([since], |row| {
                    Ok(RecentChallenge {
                        date: row.get(0)?,
                        puzzle_id: row.get(1)?,
                        grid_size: row.get(2)?,
                        difficulty: enum_column(row, 3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(DailyChallengeStats {
                total_challenges: total as u64,
                upcoming_challenges: upcoming as u64,
                recent_challenges: recent,
            })
        })
    }

    /// Assign challenges for `today` and the following `days - 1` dates.
    /// Dates that already have one count as generated.
    pub fn pregenerate_daily_challenges(
        &self,
        today: NaiveDate,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<PregenerateSummary> {
        info!("Pre-generating daily challenges for next {} days", days);

        let mut summary = PregenerateSummary {
            generated: 0,
            failed: 0,
            results: Vec::with_capacity(days as usize),
        };

        for offset in 0..days {
            let date = today + Days::new(u64::from(offset));
            let item = match self.assign_daily_challenge(date, now) {
                Ok(AssignOutcome::NoPuzzle(_)) => PregenerateItem {
                    date,
                    success: false,
                    puzzle_id: None,
                    error: Some("No puzzle available".to_string()),
                },
                Ok(outcome) => PregenerateItem {
                    date,
                    success: true,
                    puzzle_id: outcome.puzzle_id(),
                    error: None,
                },
                Err(e) => {
                    warn!("Failed to generate daily challenge for {}: {}", date, e);
                    PregenerateItem {
                        date,
                        success: false,
                        puzzle_id: None,
                        error: Some(e.to_string()),
                    }
                }
            };

            if item.success {
                summary.generated += 1;
            } else {
                summary.failed += 1;
            }
            summary.results.push(item);
        }

        info!(
            "Daily challenge pre-generation completed: {} generated, {} failed",
            summary.generated, summary.failed
        );
        Ok(summary)
    }

    /// Refill the schedule when fewer than five of the next seven days are
    /// covered.
    pub fn replenish_daily_challenges(
        &self,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ReplenishSummary> {
        let stats = self.daily_challenge_stats(today)?;

        if stats.upcoming_challenges >= UPCOMING_LOW_WATER {
            return Ok(ReplenishSummary {
                needed: false,
                generated: 0,
                failed: 0,
            });
        }

        info!(
            "Only {} upcoming daily challenges, scheduling {} days",
            stats.upcoming_challenges, REPLENISH_DAYS
        );
        let result = self.pregenerate_daily_challenges(today, REPLENISH_DAYS, now)?;

        Ok(ReplenishSummary {
            needed: true,
            generated: result.generated,
            failed: result.failed,
        })
    }
}

fn query_challenge(conn: &Connection, date: NaiveDate) -> Result<Option<DailyChallengeRow>> {
    conn.query_row(
        "SELECT id, challenge_date, puzzle_id, difficulty, participants_count, created_at
         FROM daily_challenges WHERE challenge_date = ?1",
        [date],
        |row| {
            Ok(DailyChallengeRow {
                id: row.get(0)?,
                challenge_date: row.get(1)?,
                puzzle_id: row.get(2)?,
                difficulty: enum_column::<Difficulty>(row, 3)?,
                participants_count: row.get(4)?,
                created_at: row.get(5)?,
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzles::tests::seed_puzzle;

    // 2026-10-14 is a Wednesday: 10x10 difficult
    fn wednesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        })
        .unwrap()
    }

    fn insert_puzzle_with_id(db: &Database, id: i64, grid_size: u32, difficulty: &str, usage: &str) {
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO puzzles (id, puzzle_hash, grid_size, difficulty, usage_type, puzzle_data, solution_data, seed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, '{}', '{}', 0, ?6)",
                rusqlite::params![id, format!("hash-{}", id), grid_size, difficulty, usage, Utc::now()],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn wednesday_assigns_matching_daily_puzzle() {
        let db = Database::open_in_memory().unwrap();
        insert_puzzle_with_id(&db, 42, 10, "difficult", "daily");
        let now = Utc::now();

        let outcome = db.assign_daily_challenge(wednesday(), now).unwrap();
        let AssignOutcome::Assigned { challenge, puzzle } = outcome else {
            panic!("expected an assignment");
        };
        assert_eq!(challenge.challenge_date, wednesday());
        assert_eq!(challenge.puzzle_id, 42);
        assert_eq!(challenge.difficulty, Difficulty::Difficult);
        assert_eq!(puzzle.id, 42);
        assert!(puzzle.used_at.is_some());
        assert_eq!(puzzle.used_count, 1);
        assert_eq!(count(&db, "puzzle_usage_logs"), 1);
    }

    #[test]
    fn assignment_is_idempotent_per_date() {
        let db = Database::open_in_memory().unwrap();
        seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Daily);
        seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Daily);

        let first = db.assign_daily_challenge(wednesday(), Utc::now()).unwrap();
        let second = db.assign_daily_challenge(wednesday(), Utc::now()).unwrap();

        assert!(matches!(first, AssignOutcome::Assigned { .. }));
        let AssignOutcome::Existing(existing) = second else {
            panic!("second run should be a no-op");
        };
        assert_eq!(Some(existing.puzzle_id), first.puzzle_id());
        assert_eq!(count(&db, "daily_challenges"), 1);

        // Only the assigned puzzle was consumed, exactly once
        let levels = db.stock_levels().unwrap();
        assert_eq!(levels.daily.difficult, 1);
        let puzzle = db.get_puzzle(existing.puzzle_id).unwrap().unwrap();
        assert_eq!(puzzle.used_count, 1);
    }

    #[test]
    fn no_matching_puzzle_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        // Wrong size, wrong pool, already used: none qualify for Wednesday
        seed_puzzle(&db, 7, Difficulty::Difficult, UsageType::Daily);
        seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Regular);
        let used = seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Daily);
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE puzzles SET used_at = ?1, used_count = 1 WHERE id = ?2",
                rusqlite::params![Utc::now(), used],
            )?;
            Ok(())
        })
        .unwrap();

        let outcome = db.assign_daily_challenge(wednesday(), Utc::now()).unwrap();
        let AssignOutcome::NoPuzzle(slot) = outcome else {
            panic!("expected no puzzle");
        };
        assert_eq!(slot.grid_size, 10);
        assert_eq!(count(&db, "daily_challenges"), 0);
        assert_eq!(count(&db, "puzzle_usage_logs"), 0);

        let levels = db.stock_levels().unwrap();
        assert_eq!(levels.daily.total, 1);
        assert_eq!(levels.regular.total, 1);
    }

    #[test]
    fn picks_lowest_id_first() {
        let db = Database::open_in_memory().unwrap();
        insert_puzzle_with_id(&db, 9, 10, "difficult", "daily");
        insert_puzzle_with_id(&db, 3, 10, "difficult", "daily");

        let outcome = db.assign_daily_challenge(wednesday(), Utc::now()).unwrap();
        assert_eq!(outcome.puzzle_id(), Some(3));
    }

    #[test]
    fn get_daily_challenge_returns_puzzle() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Daily);
        assert!(db.get_daily_challenge(wednesday()).unwrap().is_none());

        db.assign_daily_challenge(wednesday(), Utc::now()).unwrap();
        let (challenge, puzzle) = db.get_daily_challenge(wednesday()).unwrap().unwrap();
        assert_eq!(challenge.puzzle_id, id);
        assert_eq!(puzzle.id, id);
    }

    #[test]
    fn pregenerate_reports_per_date() {
        let db = Database::open_in_memory().unwrap();
        // Wed 10x10 difficult, Thu 7x7 medium stocked; Fri 12x12 missing
        seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Daily);
        seed_puzzle(&db, 7, Difficulty::Medium, UsageType::Daily);

        let summary = db
            .pregenerate_daily_challenges(wednesday(), 3, Utc::now())
            .unwrap();
        assert_eq!(summary.generated, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.results[0].success);
        assert!(summary.results[1].success);
        assert!(!summary.results[2].success);
        assert_eq!(summary.results[2].error.as_deref(), Some("No puzzle available"));

        // Re-running counts existing dates as generated
        let again = db
            .pregenerate_daily_challenges(wednesday(), 2, Utc::now())
            .unwrap();
        assert_eq!(again.generated, 2);
        assert_eq!(count(&db, "daily_challenges"), 2);
    }

    #[test]
    fn stats_and_replenish() {
        let db = Database::open_in_memory().unwrap();
        let today = wednesday();
        for _ in 0..3 {
            seed_puzzle(&db, 10, Difficulty::Difficult, UsageType::Daily);
            seed_puzzle(&db, 7, Difficulty::Medium, UsageType::Daily);
        }

        db.assign_daily_challenge(today, Utc::now()).unwrap();
        let stats = db.daily_challenge_stats(today).unwrap();
        assert_eq!(stats.total_challenges, 1);
        assert_eq!(stats.upcoming_challenges, 0);
        assert_eq!(stats.recent_challenges.len(), 1);
        assert_eq!(stats.recent_challenges[0].grid_size, 10);

        let refill = db.replenish_daily_challenges(today, Utc::now()).unwrap();
        assert!(refill.needed);
        // Friday, Saturday and Monday slots have no stock
        assert!(refill.generated >= 1);
        assert_eq!(refill.generated + refill.failed, REPLENISH_DAYS);

        let stats = db.daily_challenge_stats(today).unwrap();
        assert!(stats.upcoming_challenges >= 1);
    }
}
