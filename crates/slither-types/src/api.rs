use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Difficulty, LeaderboardPeriod, Permissions, User};

// -- JWT Claims --

/// Claims carried by every access token. Permissions are a snapshot taken
/// when the token was issued; `/refresh-token` picks up later changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub email: String,
    pub permissions: Permissions,
    pub iat: usize,
    pub exp: usize,
}

// -- Envelope --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub timestamp: DateTime<Utc>,
}

impl Meta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    pub meta: Meta,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            meta: Meta::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: ErrorDetail,
    pub meta: Meta,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
            meta: Meta::now(),
        }
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub permissions: Permissions,
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: User,
    pub permissions: Permissions,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub permissions: Permissions,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResponse {
    pub message: String,
    pub has_leaderboard_access: bool,
}

// -- Puzzles --

#[derive(Debug, Deserialize)]
pub struct PuzzleQuery {
    pub difficulty: Difficulty,
    pub size: Option<u32>,
}

// -- Daily challenges --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenerateRequest {
    #[serde(default = "default_generate_days")]
    pub days: u32,
}

fn default_generate_days() -> u32 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PregenerateItem {
    pub date: NaiveDate,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub puzzle_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PregenerateSummary {
    pub generated: u32,
    pub failed: u32,
    pub results: Vec<PregenerateItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplenishSummary {
    pub needed: bool,
    pub generated: u32,
    pub failed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChallenge {
    pub date: NaiveDate,
    pub puzzle_id: i64,
    pub grid_size: u32,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChallengeStats {
    pub total_challenges: u64,
    pub upcoming_challenges: u64,
    pub recent_challenges: Vec<RecentChallenge>,
}

// -- Leaderboard --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitScoreRequest {
    pub puzzle_id: i64,
    pub completion_time: i64,
    pub error_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreResponse {
    pub message: String,
    pub score: i64,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub puzzle_id: i64,
    pub score: i64,
    pub completion_time: i64,
    pub error_count: i64,
    pub submitted_at: DateTime<Utc>,
    pub difficulty: Difficulty,
    pub grid_size: u32,
    pub rank: u64,
    pub total_participants: u64,
    pub percentile: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardResponse {
    pub entries: Vec<LeaderboardEntry>,
    pub user_entry: Option<LeaderboardEntry>,
    pub last_updated: DateTime<Utc>,
    pub period: LeaderboardPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingStats {
    pub rank: u64,
    pub total_participants: u64,
    pub percentile: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRankingStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily: Option<RankingStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekly: Option<RankingStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly: Option<RankingStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<RankingStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseStatus {
    pub has_leaderboard_pass: bool,
    pub can_submit_scores: bool,
    pub can_view_real_time_rankings: bool,
}
