//! API error type. Every failure leaves the server as the standard
//! `{"success": false, "error": {"code", "message"}}` envelope.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use slither_types::api::ErrorBody;
use slither_types::models::Difficulty;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Email address is already registered")]
    EmailExists,

    #[error("Username is already taken")]
    UsernameExists,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Access token is required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("User not found or inactive")]
    UserInactive,

    #[error("User not found")]
    UserNotFound,

    #[error("User already has leaderboard access")]
    AlreadyHasAccess,

    #[error("Leaderboard pass required to submit scores")]
    PassRequired,

    #[error("Administrator access required")]
    AdminRequired,

    #[error("No available {0} puzzles found")]
    NoPuzzlesAvailable(Difficulty),

    #[error("Puzzle not found")]
    PuzzleNotFound,

    #[error("No daily challenge available for {0}")]
    ChallengeUnavailable(NaiveDate),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::EmailExists | Self::UsernameExists | Self::AlreadyHasAccess => StatusCode::CONFLICT,
            Self::InvalidCredentials
            | Self::MissingToken
            | Self::InvalidToken
            | Self::TokenExpired
            | Self::UserInactive => StatusCode::UNAUTHORIZED,
            Self::PassRequired | Self::AdminRequired => StatusCode::FORBIDDEN,
            Self::UserNotFound
            | Self::NoPuzzlesAvailable(_)
            | Self::PuzzleNotFound
            | Self::ChallengeUnavailable(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::EmailExists => "EMAIL_EXISTS",
            Self::UsernameExists => "USERNAME_EXISTS",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::MissingToken => "MISSING_TOKEN",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::UserInactive | Self::UserNotFound => "USER_NOT_FOUND",
            Self::AlreadyHasAccess => "ALREADY_HAS_ACCESS",
            Self::PassRequired => "LEADERBOARD_PASS_REQUIRED",
            Self::AdminRequired => "ADMIN_REQUIRED",
            Self::NoPuzzlesAvailable(_) => "NO_PUZZLES_AVAILABLE",
            Self::PuzzleNotFound => "PUZZLE_NOT_FOUND",
            Self::ChallengeUnavailable(_) => "DAILY_CHALLENGE_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (self.status(), Json(ErrorBody::new(self.code(), message))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
