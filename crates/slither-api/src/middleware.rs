use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use tracing::warn;

use slither_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::with_db;

/// Extract and validate the JWT from the Authorization header, then confirm
/// the account still exists and is active.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers()).ok_or(ApiError::MissingToken)?;
    let claims = decode_claims(&state, token)?;

    let user_id = claims.sub;
    let active = with_db(&state, move |db| {
        Ok(db.get_user_by_id(user_id)?.is_some_and(|u| u.is_active))
    })
    .await?;
    if !active {
        return Err(ApiError::UserInactive);
    }

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Must run inside `require_auth`.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(ApiError::MissingToken)?;

    if !state.admin_users.iter().any(|name| name == &claims.username) {
        warn!("Non-admin user {} tried an admin route", claims.username);
        return Err(ApiError::AdminRequired);
    }

    Ok(next.run(req).await)
}

/// Claims for routes that work without a login but say more with one.
/// A missing or bad token just means anonymous.
pub fn optional_claims(state: &AppState, headers: &HeaderMap) -> Option<Claims> {
    let token = bearer_token(headers)?;
    decode_claims(state, token).ok()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

fn decode_claims(state: &AppState, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => ApiError::TokenExpired,
        _ => ApiError::InvalidToken,
    })
}
