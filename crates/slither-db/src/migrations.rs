use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                email               TEXT NOT NULL UNIQUE,
                username            TEXT NOT NULL UNIQUE,
                password_hash       TEXT NOT NULL,
                display_name        TEXT,
                is_active           INTEGER NOT NULL DEFAULT 1,
                email_verified_at   TEXT,
                last_login_at       TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_users_active ON users(is_active);

            CREATE TABLE user_permissions (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id                 INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                has_leaderboard_access  INTEGER NOT NULL DEFAULT 0,
                has_ad_free_access      INTEGER NOT NULL DEFAULT 0,
                created_at              TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at              TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_user_permissions_user ON user_permissions(user_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (puzzles)");
        conn.execute_batch(
            "
            CREATE TABLE puzzles (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                puzzle_hash         TEXT NOT NULL UNIQUE,
                grid_size           INTEGER NOT NULL CHECK (grid_size >= 5 AND grid_size <= 15),
                difficulty          TEXT NOT NULL CHECK (difficulty IN ('easy', 'medium', 'difficult')),
                usage_type          TEXT NOT NULL CHECK (usage_type IN ('daily', 'regular')),
                puzzle_data         TEXT NOT NULL,
                solution_data       TEXT NOT NULL,
                seed                INTEGER NOT NULL,
                estimated_duration  INTEGER,
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                used_at             TEXT,
                used_count          INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_puzzles_selection
                ON puzzles(usage_type, difficulty, grid_size, used_at);

            CREATE TABLE puzzle_usage_logs (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                puzzle_id       INTEGER NOT NULL REFERENCES puzzles(id),
                user_id         INTEGER REFERENCES users(id) ON DELETE SET NULL,
                used_date       TEXT NOT NULL,
                usage_context   TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_usage_logs_date ON puzzle_usage_logs(used_date, usage_context);
            CREATE INDEX idx_usage_logs_puzzle ON puzzle_usage_logs(puzzle_id);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    if version < 3 {
        info!("Running migration v3 (daily challenges, leaderboard)");
        conn.execute_batch(
            "
            CREATE TABLE daily_challenges (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                challenge_date      TEXT NOT NULL UNIQUE,
                puzzle_id           INTEGER NOT NULL REFERENCES puzzles(id),
                difficulty          TEXT NOT NULL,
                participants_count  INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE leaderboard_entries (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_name       TEXT NOT NULL,
                puzzle_id       INTEGER NOT NULL REFERENCES puzzles(id),
                score           INTEGER NOT NULL,
                completion_time INTEGER NOT NULL,
                error_count     INTEGER NOT NULL,
                difficulty      TEXT NOT NULL,
                grid_size       INTEGER NOT NULL,
                submitted_at    TEXT NOT NULL
            );

            CREATE INDEX idx_leaderboard_submitted ON leaderboard_entries(submitted_at);
            CREATE INDEX idx_leaderboard_user ON leaderboard_entries(user_id);

            INSERT INTO schema_version (version) VALUES (3);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 3);

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 3);
    }

    #[test]
    fn grid_size_check_rejects_out_of_range() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO puzzles (puzzle_hash, grid_size, difficulty, usage_type, puzzle_data, solution_data, seed)
             VALUES ('h', 20, 'easy', 'daily', '{}', '{}', 1)",
            [],
        );
        assert!(result.is_err());
    }
}
