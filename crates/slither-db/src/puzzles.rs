use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use sha2::{Digest, Sha256};
use slither_types::models::{Difficulty, StockLevels, UsageType};
use tracing::{debug, info};

use crate::models::{NewPuzzle, PuzzleRow};
use crate::{Database, OptionalExt, enum_column};

pub(crate) const PUZZLE_COLUMNS: &str = "id, puzzle_hash, grid_size, difficulty, usage_type, puzzle_data,
     solution_data, seed, estimated_duration, created_at, used_at, used_count";

/// Usage log context for puzzles handed out through the regular picker.
pub const CONTEXT_REGULAR_PLAY: &str = "regular_play";
/// Usage log context for puzzles consumed by a daily challenge.
pub const CONTEXT_DAILY_CHALLENGE: &str = "daily_challenge";

impl Database {
    /// Insert a puzzle unless one with the same hash exists.
    /// Returns the new id, or `None` for a duplicate.
    pub fn insert_puzzle(&self, puzzle: &NewPuzzle, now: DateTime<Utc>) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO puzzles
                    (puzzle_hash, grid_size, difficulty, usage_type, puzzle_data, solution_data,
                     seed, estimated_duration, created_at, used_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0)",
                rusqlite::params![
                    puzzle.puzzle_hash,
                    puzzle.grid_size,
                    puzzle.difficulty.as_str(),
                    puzzle.usage_type.as_str(),
                    puzzle.puzzle_data.to_string(),
                    puzzle.solution_data.to_string(),
                    puzzle.seed,
                    puzzle.estimated_duration,
                    now,
                ],
            )?;

            if inserted == 0 {
                debug!("Duplicate puzzle skipped: {}", puzzle.puzzle_hash);
                return Ok(None);
            }
            Ok(Some(conn.last_insert_rowid()))
        })
    }

    pub fn get_puzzle(&self, id: i64) -> Result<Option<PuzzleRow>> {
        self.with_conn(|conn| query_puzzle(conn, id))
    }

    /// Pick a random unused puzzle matching the filter and mark it used in
    /// the same statement. The `used_at IS NULL` guard on the UPDATE means
    /// two callers can never both walk away with the same row.
    pub fn reserve_puzzle(
        &self,
        difficulty: Difficulty,
        usage_type: UsageType,
        grid_size: Option<u32>,
        user_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Option<PuzzleRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let sql = format!(
                "UPDATE puzzles
                 SET used_at = ?1, used_count = used_count + 1
                 WHERE id = (
                     SELECT id FROM puzzles
                     WHERE difficulty = ?2
                       AND usage_type = ?3
                       AND (?4 IS NULL OR grid_size = ?4)
                       AND used_at IS NULL
                     ORDER BY RANDOM()
                     LIMIT 1
                 )
                 AND used_at IS NULL
                 RETURNING {}",
                PUZZLE_COLUMNS
            );

            let reserved = tx
                .query_row(
                    &sql,
                    rusqlite::params![now, difficulty.as_str(), usage_type.as_str(), grid_size],
                    map_puzzle,
                )
                .optional()?;

            let Some(puzzle) = reserved else {
                return Ok(None);
            };

            log_usage(&tx, puzzle.id, user_id, CONTEXT_REGULAR_PLAY, now)?;
            tx.commit()?;

            info!(
                "Puzzle {} reserved ({}x{} {} {}) by user {}",
                puzzle.id,
                puzzle.grid_size,
                puzzle.grid_size,
                puzzle.difficulty,
                puzzle.usage_type,
                user_id.map_or_else(|| "anonymous".to_string(), |id| id.to_string())
            );
            Ok(Some(puzzle))
        })
    }

    /// Unused puzzle counts grouped by pool and difficulty.
    pub fn stock_levels(&self) -> Result<StockLevels> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT usage_type, difficulty, COUNT(*) FROM puzzles
                 WHERE used_at IS NULL
                 GROUP BY usage_type, difficulty",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        enum_column::<UsageType>(row, 0)?,
                        enum_column::<Difficulty>(row, 1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut levels = StockLevels::default();
            for (usage_type, difficulty, count) in rows {
                let count = count as u64;
                match usage_type {
                    UsageType::Daily => levels.daily.add(difficulty, count),
                    UsageType::Regular => levels.regular.add(difficulty, count),
                }
            }
            levels.total = levels.daily.total + levels.regular.total;

            Ok(levels)
        })
    }

    /// Unused puzzles in one pool with an exact size and difficulty.
    pub fn count_available(
        &self,
        usage_type: UsageType,
        difficulty: Difficulty,
        grid_size: u32,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM puzzles
                 WHERE usage_type = ?1 AND difficulty = ?2 AND grid_size = ?3 AND used_at IS NULL",
                rusqlite::params![usage_type.as_str(), difficulty.as_str(), grid_size],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

/// SHA-256 over the serialized clue grid; identical layouts hash equal.
pub fn puzzle_hash(clues: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(clues.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Rough solve time in seconds.
pub fn estimate_duration(difficulty: Difficulty, grid_size: u32) -> u32 {
    let base = f64::from(grid_size * grid_size * 2);
    let multiplier = match difficulty {
        Difficulty::Easy => 1.0,
        Difficulty::Medium => 1.5,
        Difficulty::Difficult => 2.5,
    };
    (base * multiplier).round() as u32
}

pub(crate) fn query_puzzle(conn: &Connection, id: i64) -> Result<Option<PuzzleRow>> {
    let sql = format!("SELECT {} FROM puzzles WHERE id = ?1", PUZZLE_COLUMNS);
    conn.query_row(&sql, [id], map_puzzle).optional()
}

pub(crate) fn map_puzzle(row: &rusqlite::Row<'_>) -> rusqlite::Result<PuzzleRow> {
    Ok(PuzzleRow {
        id: row.get(0)?,
        puzzle_hash: row.get(1)?,
        grid_size: row.get(2)?,
        difficulty: enum_column(row, 3)?,
        usage_type: enum_column(row, 4)?,
        puzzle_data: row.get(5)?,
        solution_data: row.get(6)?,
        seed: row.get(7)?,
        estimated_duration: row.get(8)?,
        created_at: row.get(9)?,
        used_at: row.get(10)?,
        used_count: row.get(11)?,
    })
}

pub(crate) fn log_usage(
    conn: &Connection,
    puzzle_id: i64,
    user_id: Option<i64>,
    context: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO puzzle_usage_logs (puzzle_id, user_id, used_date, usage_context, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![puzzle_id, user_id, now.date_naive(), context, now],
    )?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    pub(crate) fn seed_puzzle(
        db: &Database,
        grid_size: u32,
        difficulty: Difficulty,
        usage_type: UsageType,
    ) -> i64 {
        static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
        let n = NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let clues = json!({ "clues": [[n]], "gridSize": grid_size });
        let puzzle = NewPuzzle {
            puzzle_hash: puzzle_hash(&clues),
            grid_size,
            difficulty,
            usage_type,
            puzzle_data: clues,
            solution_data: json!({ "pairs": [] }),
            seed: n as i64,
            estimated_duration: Some(estimate_duration(difficulty, grid_size)),
        };
        db.insert_puzzle(&puzzle, Utc::now()).unwrap().unwrap()
    }

    fn usage_logs(db: &Database, puzzle_id: i64) -> Vec<String> {
        db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT usage_context FROM puzzle_usage_logs WHERE puzzle_id = ?1")?;
            let rows = stmt
                .query_map([puzzle_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
        .unwrap()
    }

    #[test]
    fn duplicate_hash_is_skipped() {
        let db = Database::open_in_memory().unwrap();
        let clues = json!([[1, null], [null, 2]]);
        let puzzle = NewPuzzle {
            puzzle_hash: puzzle_hash(&clues),
            grid_size: 5,
            difficulty: Difficulty::Easy,
            usage_type: UsageType::Regular,
            puzzle_data: clues,
            solution_data: json!({}),
            seed: 7,
            estimated_duration: None,
        };
        assert!(db.insert_puzzle(&puzzle, Utc::now()).unwrap().is_some());
        assert!(db.insert_puzzle(&puzzle, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn reserve_marks_used_and_logs() {
        let db = Database::open_in_memory().unwrap();
        let id = seed_puzzle(&db, 7, Difficulty::Medium, UsageType::Regular);

        let puzzle = db
            .reserve_puzzle(Difficulty::Medium, UsageType::Regular, Some(7), None, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(puzzle.id, id);
        assert!(puzzle.used_at.is_some());
        assert_eq!(puzzle.used_count, 1);
        assert_eq!(usage_logs(&db, id), vec![CONTEXT_REGULAR_PLAY.to_string()]);

        // Pool is now empty
        let again = db
            .reserve_puzzle(Difficulty::Medium, UsageType::Regular, Some(7), None, Utc::now())
            .unwrap();
        assert!(again.is_none());
    }

    #[test]
    fn reserve_respects_filters() {
        let db = Database::open_in_memory().unwrap();
        seed_puzzle(&db, 7, Difficulty::Medium, UsageType::Daily);
        seed_puzzle(&db, 10, Difficulty::Medium, UsageType::Regular);

        // Daily pool is never handed to regular play
        let none = db
            .reserve_puzzle(Difficulty::Medium, UsageType::Regular, Some(7), None, Utc::now())
            .unwrap();
        assert!(none.is_none());

        // Without a size filter any size matches
        let any = db
            .reserve_puzzle(Difficulty::Medium, UsageType::Regular, None, None, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(any.grid_size, 10);
        assert_eq!(any.usage_type, UsageType::Regular);
    }

    #[test]
    fn reserve_never_returns_used_puzzle() {
        let db = Database::open_in_memory().unwrap();
        for _ in 0..5 {
            seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);
        }
        let player = db
            .create_user("player@example.com", "player", "hash", None, Utc::now())
            .unwrap();

        let mut seen = HashSet::new();
        while let Some(p) = db
            .reserve_puzzle(Difficulty::Easy, UsageType::Regular, Some(5), Some(player.id), Utc::now())
            .unwrap()
        {
            assert_eq!(p.used_count, 1);
            assert!(seen.insert(p.id), "puzzle {} handed out twice", p.id);
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn concurrent_reservations_are_disjoint() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        for _ in 0..20 {
            seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(p) = db
                        .reserve_puzzle(Difficulty::Easy, UsageType::Regular, None, None, Utc::now())
                        .unwrap()
                    {
                        ids.push(p.id);
                    }
                    ids
                })
            })
            .collect();

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.join().unwrap());
        }
        let unique: HashSet<_> = all.iter().copied().collect();
        assert_eq!(all.len(), 20);
        assert_eq!(unique.len(), 20);
    }

    #[test]
    fn stock_levels_count_unused_only() {
        let db = Database::open_in_memory().unwrap();
        seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Daily);
        seed_puzzle(&db, 7, Difficulty::Medium, UsageType::Daily);
        seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);
        seed_puzzle(&db, 5, Difficulty::Easy, UsageType::Regular);

        db.reserve_puzzle(Difficulty::Easy, UsageType::Regular, None, None, Utc::now())
            .unwrap()
            .unwrap();

        let levels = db.stock_levels().unwrap();
        assert_eq!(levels.daily.easy, 1);
        assert_eq!(levels.daily.medium, 1);
        assert_eq!(levels.daily.total, 2);
        assert_eq!(levels.regular.easy, 1);
        assert_eq!(levels.total, 3);
        assert_eq!(db.count_available(UsageType::Daily, Difficulty::Easy, 5).unwrap(), 1);
    }

    #[test]
    fn duration_estimate_scales_with_difficulty() {
        assert_eq!(estimate_duration(Difficulty::Easy, 5), 50);
        assert_eq!(estimate_duration(Difficulty::Medium, 10), 300);
        assert_eq!(estimate_duration(Difficulty::Difficult, 15), 1125);
    }
}
