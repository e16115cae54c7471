//! Fixed-window request limits keyed by client IP.
//!
//! Each limiter counts hits per address inside a window; the first request
//! after the window closes starts a fresh one. Responses carry the
//! `RateLimit-*` headers, and rejected ones add `Retry-After` and the usual
//! error envelope with the limiter's own code.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use slither_types::api::ErrorBody;
use tracing::warn;

/// Tracked addresses before expired windows are swept.
const SWEEP_THRESHOLD: usize = 10_000;

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    code: &'static str,
    message: &'static str,
    hits: Mutex<HashMap<IpAddr, Window>>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration, code: &'static str, message: &'static str) -> Self {
        Self {
            limit,
            window,
            code,
            message,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Register/login: 5 per 15 minutes.
    pub fn auth() -> Self {
        Self::new(
            5,
            Duration::from_secs(15 * 60),
            "TOO_MANY_AUTH_ATTEMPTS",
            "Too many authentication attempts, please try again later",
        )
    }

    pub fn purchase() -> Self {
        Self::new(
            3,
            Duration::from_secs(60 * 60),
            "TOO_MANY_PURCHASE_ATTEMPTS",
            "Too many purchase attempts, please try again later",
        )
    }

    pub fn puzzle() -> Self {
        Self::new(
            10,
            Duration::from_secs(60),
            "PUZZLE_RATE_LIMIT",
            "Too many puzzle requests, please try again later",
        )
    }

    pub fn daily_challenge() -> Self {
        Self::new(
            20,
            Duration::from_secs(60),
            "DAILY_CHALLENGE_RATE_LIMIT",
            "Too many daily challenge requests, please try again later",
        )
    }

    pub fn admin() -> Self {
        Self::new(
            5,
            Duration::from_secs(5 * 60),
            "ADMIN_RATE_LIMIT",
            "Too many admin requests, please try again later",
        )
    }

    pub fn check(&self, ip: IpAddr, now: Instant) -> Decision {
        let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());

        if hits.len() >= SWEEP_THRESHOLD {
            hits.retain(|_, w| now.duration_since(w.started) < self.window);
        }

        let window = hits.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        let reset_after = self.window.saturating_sub(now.duration_since(window.started));
        if window.count >= self.limit {
            return Decision {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        Decision {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - window.count,
            reset_after,
        }
    }
}

/// Middleware: `middleware::from_fn_with_state(limiter, rate_limit::enforce)`.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let decision = limiter.check(addr.ip(), Instant::now());

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        warn!(
            "Rate limit {} hit by {} on {}",
            limiter.code,
            addr.ip(),
            req.uri().path()
        );
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(ErrorBody::new(limiter.code, limiter.message)),
        )
            .into_response();
        response
            .headers_mut()
            .insert("retry-after", HeaderValue::from(reset_secs(&decision)));
        response
    };

    set_headers(response.headers_mut(), &decision);
    response
}

fn reset_secs(decision: &Decision) -> u64 {
    // Round up so clients never retry a moment too early.
    decision.reset_after.as_millis().div_ceil(1000) as u64
}

fn set_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert("ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("ratelimit-reset", HeaderValue::from(reset_secs(decision)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn blocks_after_limit() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60), "TEST", "slow down");
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let d = limiter.check(ip(1), now);
            assert!(d.allowed);
            assert_eq!(d.remaining, expected_remaining);
        }

        let blocked = limiter.check(ip(1), now + Duration::from_secs(10));
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert_eq!(blocked.reset_after, Duration::from_secs(50));
        assert_eq!(reset_secs(&blocked), 50);
    }

    #[test]
    fn addresses_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), "TEST", "slow down");
        let now = Instant::now();

        assert!(limiter.check(ip(1), now).allowed);
        assert!(!limiter.check(ip(1), now).allowed);
        assert!(limiter.check(ip(2), now).allowed);
    }

    #[test]
    fn window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60), "TEST", "slow down");
        let now = Instant::now();

        assert!(limiter.check(ip(1), now).allowed);
        assert!(!limiter.check(ip(1), now + Duration::from_secs(59)).allowed);
        assert!(limiter.check(ip(1), now + Duration::from_secs(60)).allowed);
    }
}
