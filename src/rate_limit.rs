//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down signup
//! spam, credential stuffing and reset-mail flooding.

use axum::{
    Json,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use serde::Serialize;
use std::{num::NonZeroU32, sync::Arc, time::Duration};

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Length of every rate limit window.
const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Maximum requests per client IP per 15 minute window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub register: u32,
    pub login: u32,
    pub forgot_password: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            register: 5,
            login: 30,
            forgot_password: 3,
        }
    }
}

/// At most `max` requests in any `window`: the whole budget is a burst and
/// one slot comes back per full window.
fn window_quota(max: NonZeroU32, window: Duration) -> Quota {
    // Quota::with_period only returns None for a zero period
    Quota::with_period(window)
        .unwrap_or_else(|| Quota::per_second(max))
        .allow_burst(max)
}

fn limiter(max: u32, window: Duration) -> Arc<IpLimiter> {
    let max = NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(window_quota(max, window)))
}

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Registration: 5 per 15 minutes
    pub register: Arc<IpLimiter>,
    /// Login: 30 per 15 minutes
    pub login: Arc<IpLimiter>,
    /// Forgot password: 3 per 15 minutes
    pub forgot_password: Arc<IpLimiter>,
    /// Proxy hops to trust when keying by client IP
    pub trust_proxy_hops: usize,
}

impl RateLimitConfig {
    pub fn new(limits: RateLimits, trust_proxy_hops: usize) -> Self {
        Self {
            register: limiter(limits.register, WINDOW),
            login: limiter(limits.login, WINDOW),
            forgot_password: limiter(limits.forgot_password, WINDOW),
            trust_proxy_hops,
        }
    }
}

#[derive(Serialize)]
struct LimitedResponse {
    error: &'static str,
}

async fn check(
    limiter: &IpLimiter,
    trust_proxy_hops: usize,
    message: &'static str,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, trust_proxy_hops) {
        Ok(ip) => ip,
        Err(_) => {
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(%ip, "Rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                Json(LimitedResponse { error: message }),
            )
                .into_response()
        }
    }
}

/// Middleware for rate limiting registration.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.register,
        config.trust_proxy_hops,
        "Too many register attempts from this IP. Please try again later.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting login.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.login,
        config.trust_proxy_hops,
        "Too many login attempts from this IP. Please try again later.",
        request,
        next,
    )
    .await
}

/// Middleware for rate limiting password reset mails.
pub async fn rate_limit_forgot_password(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    check(
        &config.forgot_password,
        config.trust_proxy_hops,
        "Too many forgot passwords attempts from this IP. Please try again later.",
        request,
        next,
    )
    .await
}
