use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

use crate::auth::{self, AppState};
use crate::error::ApiError;
use crate::middleware::{require_admin, require_auth};
use crate::rate_limit::{self, RateLimiter};
use crate::{daily, leaderboard, ok, puzzles, with_db};

/// The full HTTP surface. The caller adds CORS, tracing and connect-info.
pub fn build(state: AppState) -> Router {
    let auth_limiter = Arc::new(RateLimiter::auth());
    let purchase_limiter = Arc::new(RateLimiter::purchase());
    let puzzle_limiter = Arc::new(RateLimiter::puzzle());
    let daily_limiter = Arc::new(RateLimiter::daily_challenge());
    let admin_limiter = Arc::new(RateLimiter::admin());

    let authed = || middleware::from_fn_with_state(state.clone(), require_auth);
    let admin_only = || middleware::from_fn_with_state(state.clone(), require_admin);

    // -- Auth --
    let auth_public = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route_layer(middleware::from_fn_with_state(auth_limiter, rate_limit::enforce));

    let purchase = Router::new()
        .route("/purchase/leaderboard-access", post(auth::purchase_leaderboard_access))
        .route_layer(middleware::from_fn_with_state(purchase_limiter, rate_limit::enforce));

    let auth_protected = Router::new()
        .route("/profile", get(auth::profile))
        .route("/refresh-token", post(auth::refresh_token))
        .merge(purchase)
        .route_layer(authed());

    // -- Puzzles --
    let puzzle_admin = Router::new()
        .route("/{id}", get(puzzles::get_puzzle_by_id))
        .route_layer(admin_only())
        .route_layer(authed());

    let puzzle_routes = Router::new()
        .route(
            "/",
            get(puzzles::get_puzzle)
                .route_layer(middleware::from_fn_with_state(puzzle_limiter, rate_limit::enforce)),
        )
        .route("/stats", get(puzzles::stock_stats))
        .merge(puzzle_admin);

    // -- Daily challenge --
    let daily_admin = Router::new()
        .route("/admin/stats", get(daily::admin_stats))
        .route("/admin/generate", post(daily::admin_generate))
        .route("/admin/check-stock", post(daily::admin_check_stock))
        .route_layer(admin_only())
        .route_layer(authed())
        .route_layer(middleware::from_fn_with_state(admin_limiter, rate_limit::enforce));

    let daily_routes = Router::new()
        .route("/", get(daily::today))
        .route("/{date}", get(daily::by_date))
        .merge(daily_admin)
        .route_layer(middleware::from_fn_with_state(daily_limiter, rate_limit::enforce));

    // -- Leaderboard --
    let leaderboard_protected = Router::new()
        .route("/submit", post(leaderboard::submit_score))
        .route("/user/stats", get(leaderboard::user_stats))
        .route("/purchase-status", get(leaderboard::purchase_status))
        .route_layer(authed());

    let leaderboard_routes = Router::new()
        .route("/{type}", get(leaderboard::get_leaderboard))
        .merge(leaderboard_protected);

    Router::new()
        .route("/health", get(health))
        .nest("/api/auth", auth_public.merge(auth_protected))
        .nest("/api/puzzle", puzzle_routes)
        .nest("/api/v1/daily-challenge", daily_routes)
        .nest("/api/leaderboard", leaderboard_routes)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    with_db(&state, |db| db.ping()).await?;
    Ok(ok(json!({ "status": "ok" })))
}
