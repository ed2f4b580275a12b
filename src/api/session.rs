//! Session endpoints.
//!
//! - POST `/refresh-token` - Exchange the refresh cookie for a new cookie pair
//! - GET `/me` - Claims of the current access token

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::error::{ApiError, ResultExt, message};
use crate::auth::{Auth, CookiePolicy, REFRESH_COOKIE_NAME, SocketIp, append_set_cookies, get_cookie};
use crate::db::Database;
use crate::geo::{GeoLocator, public_client_ip};
use crate::impl_has_auth_backend;
use crate::jwt::{AccessClaims, TokenService};

#[derive(Clone)]
pub struct SessionState {
    pub db: Database,
    pub tokens: Arc<TokenService>,
    pub cookies: CookiePolicy,
    pub geo: GeoLocator,
    pub trust_proxy_hops: usize,
}

impl_has_auth_backend!(SessionState);

pub fn router(state: SessionState) -> Router {
    Router::new()
        .route("/refresh-token", post(refresh_token))
        .route("/me", get(me))
        .with_state(state)
}

/// Issue a fresh pair from a valid refresh cookie.
/// The user must still exist; nothing else is checked.
async fn refresh_token(
    State(state): State<SessionState>,
    SocketIp(socket): SocketIp,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("No refresh token provided"))?;

    let claims = state.tokens.verify_refresh(token).map_err(|e| {
        debug!(error = %e, "Rejected refresh token");
        ApiError::unauthorized("Invalid or expired refresh token")
    })?;

    let user = state
        .db
        .users()
        .get_by_id(&claims.id)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    let tokens = state
        .tokens
        .issue(&user)
        .internal_err("Failed to issue tokens")?;

    state.geo.spawn_best_effort(
        user.id.clone(),
        public_client_ip(&headers, socket, state.trust_proxy_hops),
    );

    let mut response = message("Tokens refreshed").into_response();
    append_set_cookies(
        response.headers_mut(),
        state.cookies.inject_session_cookies(&tokens),
    );
    Ok(response)
}

#[derive(Serialize)]
struct MeResponse {
    user: AccessClaims,
}

async fn me(Auth(user): Auth) -> impl IntoResponse {
    Json(MeResponse { user: user.claims })
}
