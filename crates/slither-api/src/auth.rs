use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};

use slither_db::{Database, UserConflict};
use slither_db::models::UserRow;
use slither_types::api::{
    AuthResponse, Claims, LoginRequest, ProfileResponse, PurchaseResponse, RegisterRequest,
    TokenResponse,
};
use slither_types::models::Permissions;

use crate::error::ApiError;
use crate::{ok, with_db};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub jwt_ttl: chrono::Duration,
    /// Usernames allowed through the admin routes.
    pub admin_users: Vec<String>,
}

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 30;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const MAX_DISPLAY_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;

pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    validate_registration(&req)?;

    let user = with_db(&state, move |db| {
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
            .to_string();

        db.create_user(
            &req.email,
            &req.username,
            &password_hash,
            req.display_name.as_deref(),
            Utc::now(),
        )
    })
    .await
    .map_err(|e| match e {
        ApiError::Internal(inner) => match inner.downcast_ref::<UserConflict>() {
            Some(UserConflict::Email) => ApiError::EmailExists,
            Some(UserConflict::Username) => ApiError::UsernameExists,
            None => ApiError::Internal(inner),
        },
        other => other,
    })?;

    let permissions = Permissions::default();
    let token = create_token(&state, &user, permissions)?;

    info!("User registered: {}", user.username);
    Ok((
        StatusCode::CREATED,
        ok(AuthResponse {
            user: user.to_api(),
            permissions,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()));
    }

    let (user, permissions) = with_db(&state, move |db| {
        let Some(mut user) = db.get_user_by_email(&req.email)? else {
            return Ok(None);
        };
        if !user.is_active || !verify_password(&user.password_hash, &req.password) {
            return Ok(None);
        }

        let now = Utc::now();
        db.record_login(user.id, now)?;
        user.last_login_at = Some(now);

        let permissions = db
            .get_permissions(user.id)?
            .map(|p| p.to_api())
            .unwrap_or_default();
        Ok(Some((user, permissions)))
    })
    .await?
    .ok_or(ApiError::InvalidCredentials)?;

    let token = create_token(&state, &user, permissions)?;

    info!("User logged in: {}", user.username);
    Ok(ok(AuthResponse {
        user: user.to_api(),
        permissions,
        token,
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, permissions) = load_user(&state, claims.sub).await?;

    Ok(ok(ProfileResponse {
        user: user.to_api(),
        permissions,
    }))
}

/// Issue a fresh token carrying the user's current permissions.
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, permissions) = load_user(&state, claims.sub).await?;
    let token = create_token(&state, &user, permissions)?;

    Ok(ok(TokenResponse { token, permissions }))
}

/// Grants leaderboard access outright; there is no payment provider behind
/// this yet.
pub async fn purchase_leaderboard_access(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let granted = with_db(&state, move |db| db.grant_leaderboard_access(user_id, Utc::now())).await?;

    if !granted {
        return Err(ApiError::AlreadyHasAccess);
    }

    info!("User {} purchased leaderboard access", claims.username);
    Ok(ok(PurchaseResponse {
        message: "Leaderboard access purchased successfully".to_string(),
        has_leaderboard_access: true,
    }))
}

async fn load_user(state: &AppState, user_id: i64) -> Result<(UserRow, Permissions), ApiError> {
    with_db(state, move |db| {
        let Some(user) = db.get_user_by_id(user_id)? else {
            return Ok(None);
        };
        let permissions = db
            .get_permissions(user_id)?
            .map(|p| p.to_api())
            .unwrap_or_default();
        Ok(Some((user, permissions)))
    })
    .await?
    .ok_or(ApiError::UserNotFound)
}

fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Unparseable password hash in database: {}", e);
            false
        }
    }
}

fn validate_registration(req: &RegisterRequest) -> Result<(), ApiError> {
    if !is_valid_email(&req.email) {
        return Err(ApiError::Validation("A valid email address is required".into()));
    }

    let username_len = req.username.chars().count();
    if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username_len)
        || !req.username.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(ApiError::Validation(format!(
            "Username must be {}-{} letters or digits",
            MIN_USERNAME_LEN, MAX_USERNAME_LEN
        )));
    }

    if req.password.len() < MIN_PASSWORD_LEN || req.password.len() > MAX_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be {}-{} characters",
            MIN_PASSWORD_LEN, MAX_PASSWORD_LEN
        )));
    }

    if req
        .display_name
        .as_ref()
        .is_some_and(|name| name.chars().count() > MAX_DISPLAY_NAME_LEN)
    {
        return Err(ApiError::Validation(format!(
            "Display name must be at most {} characters",
            MAX_DISPLAY_NAME_LEN
        )));
    }

    Ok(())
}

fn is_valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        }
        None => false,
    }
}

pub(crate) fn create_token(
    state: &AppStateInner,
    user: &UserRow,
    permissions: Permissions,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        permissions,
        iat: now.timestamp() as usize,
        exp: (now + state.jwt_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(token)
}
