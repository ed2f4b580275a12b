use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use std::sync::Arc;

use super::error::{ApiError, ResultExt};
use crate::auth::Auth;
use crate::db::Database;
use crate::impl_has_auth_backend;
use crate::jwt::TokenService;

#[derive(Clone)]
pub struct ProfileState {
    pub db: Database,
    pub tokens: Arc<TokenService>,
}

impl_has_auth_backend!(ProfileState);

pub fn router(state: ProfileState) -> Router {
    Router::new()
        .route("/geo-status", get(geo_status))
        .with_state(state)
}

/// Whether the current user can take part in location matching yet.
async fn geo_status(
    State(state): State<ProfileState>,
    Auth(user): Auth,
) -> Result<impl IntoResponse, ApiError> {
    let status = state
        .db
        .users()
        .geo_status(user.id())
        .await
        .db_err("Failed to get geo status")?;

    Ok(Json(status))
}
