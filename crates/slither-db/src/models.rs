//! Database row types. These map directly to SQLite rows and stay
//! separate from the slither-types API models.

use chrono::{DateTime, NaiveDate, Utc};
use slither_types::models::{Difficulty, Permissions, Puzzle, UsageType, User};

#[derive(Debug)]
pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    pub fn to_api(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

#[derive(Debug)]
pub struct PermissionRow {
    pub user_id: i64,
    pub has_leaderboard_access: bool,
    pub has_ad_free_access: bool,
}

impl PermissionRow {
    pub fn to_api(&self) -> Permissions {
        Permissions {
            has_leaderboard_access: self.has_leaderboard_access,
            has_ad_free_access: self.has_ad_free_access,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PuzzleRow {
    pub id: i64,
    pub puzzle_hash: String,
    pub grid_size: u32,
    pub difficulty: Difficulty,
    pub usage_type: UsageType,
    /// JSON text
    pub puzzle_data: String,
    /// JSON text
    pub solution_data: String,
    pub seed: i64,
    pub estimated_duration: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub used_count: u32,
}

impl PuzzleRow {
    /// Player-facing view. Never includes the solution.
    pub fn to_api(&self) -> Puzzle {
        Puzzle {
            id: self.id,
            puzzle_hash: self.puzzle_hash.clone(),
            grid_size: self.grid_size,
            difficulty: self.difficulty,
            estimated_duration: self.estimated_duration,
            puzzle_data: serde_json::from_str(&self.puzzle_data).unwrap_or_else(|e| {
                tracing::warn!("Corrupt puzzle_data on puzzle {}: {}", self.id, e);
                serde_json::Value::Null
            }),
        }
    }
}

/// Puzzle awaiting insertion, e.g. from an import file.
#[derive(Debug)]
pub struct NewPuzzle {
    pub puzzle_hash: String,
    pub grid_size: u32,
    pub difficulty: Difficulty,
    pub usage_type: UsageType,
    pub puzzle_data: serde_json::Value,
    pub solution_data: serde_json::Value,
    pub seed: i64,
    pub estimated_duration: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DailyChallengeRow {
    pub id: i64,
    pub challenge_date: NaiveDate,
    pub puzzle_id: i64,
    pub difficulty: Difficulty,
    pub participants_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A leaderboard entry together with its position in the ranked window.
#[derive(Debug)]
pub struct RankedEntryRow {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub puzzle_id: i64,
    pub score: i64,
    pub completion_time: i64,
    pub error_count: i64,
    pub difficulty: Difficulty,
    pub grid_size: u32,
    pub submitted_at: DateTime<Utc>,
    pub rank: u64,
    pub total_participants: u64,
}
