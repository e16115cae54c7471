use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

impl Difficulty {
    pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Difficult];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Difficult => "difficult",
        }
    }
}

/// Tag separating puzzles held back for daily challenges from the regular
/// play pool. The two pools never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    Daily,
    Regular,
}

impl UsageType {
    pub const ALL: [UsageType; 2] = [UsageType::Daily, UsageType::Regular];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Regular => "regular",
        }
    }
}

/// Time window a leaderboard ranks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    Monthly,
    Total,
}

impl LeaderboardPeriod {
    pub const ALL: [LeaderboardPeriod; 4] = [
        LeaderboardPeriod::Daily,
        LeaderboardPeriod::Weekly,
        LeaderboardPeriod::Monthly,
        LeaderboardPeriod::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Total => "total",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.kind, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

macro_rules! str_enum {
    ($ty:ident, $kind:literal) => {
        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Difficulty, "difficulty");
str_enum!(UsageType, "usage type");
str_enum!(LeaderboardPeriod, "leaderboard type");

/// Smallest and largest grid sizes a puzzle may have.
pub const MIN_GRID_SIZE: u32 = 5;
pub const MAX_GRID_SIZE: u32 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permissions {
    pub has_leaderboard_access: bool,
    pub has_ad_free_access: bool,
}

/// Puzzle as handed to players. Solution data stays server side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: i64,
    pub puzzle_hash: String,
    pub grid_size: u32,
    pub difficulty: Difficulty,
    pub estimated_duration: Option<u32>,
    pub puzzle_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyChallenge {
    pub challenge_date: NaiveDate,
    pub puzzle_id: i64,
    pub difficulty: Difficulty,
    pub grid_size: u32,
    pub display_name: String,
    pub puzzle: Puzzle,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyStock {
    pub easy: u64,
    pub medium: u64,
    pub difficult: u64,
    pub total: u64,
}

impl DifficultyStock {
    pub fn add(&mut self, difficulty: Difficulty, count: u64) {
        match difficulty {
            Difficulty::Easy => self.easy += count,
            Difficulty::Medium => self.medium += count,
            Difficulty::Difficult => self.difficult += count,
        }
        self.total += count;
    }
}

/// Unused puzzle counts per pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub daily: DifficultyStock,
    pub regular: DifficultyStock,
    pub total: u64,
}
