mod accounts;
mod error;
mod profile;
mod session;

use axum::Router;
use std::sync::Arc;

use crate::auth::CookiePolicy;
use crate::db::Database;
use crate::geo::GeoLocator;
use crate::jwt::TokenService;
use crate::mailer::Mailer;
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;

/// Everything the API handlers share.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Database,
    pub tokens: Arc<TokenService>,
    pub cookies: CookiePolicy,
    pub mailer: Arc<dyn Mailer>,
    pub geo: GeoLocator,
    pub trust_proxy_hops: usize,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

/// Create the API router.
pub fn create_api_router(ctx: ApiContext) -> Router {
    let session_state = session::SessionState {
        db: ctx.db.clone(),
        tokens: ctx.tokens.clone(),
        cookies: ctx.cookies.clone(),
        geo: ctx.geo.clone(),
        trust_proxy_hops: ctx.trust_proxy_hops,
    };

    let profile_state = profile::ProfileState {
        db: ctx.db.clone(),
        tokens: ctx.tokens.clone(),
    };

    let accounts_state = accounts::AccountsState {
        db: ctx.db,
        tokens: ctx.tokens,
        cookies: ctx.cookies,
        mailer: ctx.mailer,
        geo: ctx.geo,
        trust_proxy_hops: ctx.trust_proxy_hops,
        rate_limit_config: ctx.rate_limit_config,
    };

    Router::new()
        .merge(accounts::router(accounts_state))
        .merge(session::router(session_state))
        .nest("/api/profile", profile::router(profile_state))
}
