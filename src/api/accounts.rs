//! Local account endpoints.
//!
//! - POST `/register` - Create an unverified account and mail a verification link
//! - POST `/login` - Check credentials and set session cookies
//! - POST `/verify` - Confirm an email address
//! - POST `/forgot-password` - Mail a password reset link
//! - POST `/reset-password` - Set a new password from a reset link
//! - POST `/logout` - Clear session cookies

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{ApiError, ResultExt, message};
use crate::auth::{CookiePolicy, SocketIp, append_set_cookies};
use crate::db::Database;
use crate::geo::{GeoLocator, public_client_ip};
use crate::jwt::TokenService;
use crate::mailer::Mailer;
use crate::password::{hash_password, verify_password};
use crate::rate_limit::{
    RateLimitConfig, rate_limit_forgot_password, rate_limit_login, rate_limit_register,
};

const MAX_EMAIL_LENGTH: usize = 254;
const MAX_DISPLAY_NAME_LENGTH: usize = 254;
const MAX_PASSWORD_LENGTH: usize = 1024;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Clone)]
pub struct AccountsState {
    pub db: Database,
    pub tokens: Arc<TokenService>,
    pub cookies: CookiePolicy,
    pub mailer: Arc<dyn Mailer>,
    pub geo: GeoLocator,
    pub trust_proxy_hops: usize,
    pub rate_limit_config: Arc<RateLimitConfig>,
}

pub fn router(state: AccountsState) -> Router {
    let limits = state.rate_limit_config.clone();

    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            limits.clone(),
            rate_limit_register,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(limits.clone(), rate_limit_login));

    let forgot_router = Router::new()
        .route("/forgot-password", post(forgot_password))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            limits,
            rate_limit_forgot_password,
        ));

    let open_router = Router::new()
        .route("/verify", post(verify))
        .route("/reset-password", post(reset_password))
        .route("/logout", post(logout))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(forgot_router)
        .merge(open_router)
}

/// Loose syntactic email check: one `@`, a dotted domain, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LENGTH {
        return false;
    }
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }
    domain.contains('.') && domain.split('.').all(|label| !label.is_empty())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    password: String,
}

async fn register(
    State(state): State<AccountsState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    let display_name: String = payload
        .display_name
        .trim()
        .chars()
        .take(MAX_DISPLAY_NAME_LENGTH)
        .collect();

    let mut errors = Vec::new();
    if !is_valid_email(email) {
        errors.push("Invalid email format".to_string());
    }
    if display_name.is_empty() {
        errors.push("Display name is required".to_string());
    }
    if payload.password.is_empty() {
        errors.push("Password is required".to_string());
    } else if payload.password.len() > MAX_PASSWORD_LENGTH {
        errors.push("Password is too long".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let existing = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to look up user")?;
    if existing.is_some() {
        return Err(ApiError::bad_request("User already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();

    // Mail first: an account whose link never went out is useless
    let token = state
        .tokens
        .issue_email_verification(&id)
        .internal_err("Failed to create verification token")?;
    state
        .mailer
        .send_email_verification(email, &token)
        .await
        .internal_err("Failed to send verification email")?;

    let password_hash =
        hash_password(&payload.password).internal_err("Failed to hash password")?;

    state
        .db
        .users()
        .create(&id, email, &display_name, &password_hash)
        .await
        .db_err("Failed to create user")?;

    info!(user_id = %id, "User registered");

    Ok((StatusCode::CREATED, message("Verification email sent")))
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
}

#[derive(Serialize)]
struct LoginResponse {
    user: UserSummary,
}

async fn login(
    State(state): State<AccountsState>,
    SocketIp(socket): SocketIp,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let user = state
        .db
        .users()
        .get_by_email(payload.email.trim())
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    if !user.is_verified {
        return Err(ApiError::unauthorized("Email not verified"));
    }

    // Accounts created through an OAuth provider have no password
    let Some(hash) = user.password_hash.as_deref() else {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    };

    let matches = verify_password(&payload.password, hash).unwrap_or_else(|e| {
        warn!(user_id = %user.id, error = %e, "Stored password hash is unreadable");
        false
    });
    if !matches {
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    let tokens = state
        .tokens
        .issue(&user)
        .internal_err("Failed to issue tokens")?;

    state.geo.spawn_best_effort(
        user.id.clone(),
        public_client_ip(&headers, socket, state.trust_proxy_hops),
    );

    info!(user_id = %user.id, "User logged in");

    let mut response = Json(LoginResponse {
        user: UserSummary {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
        },
    })
    .into_response();
    append_set_cookies(
        response.headers_mut(),
        state.cookies.inject_session_cookies(&tokens),
    );
    Ok(response)
}

#[derive(Deserialize)]
struct TokenRequest {
    #[serde(default)]
    token: String,
}

async fn verify(
    State(state): State<AccountsState>,
    Json(payload): Json<TokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = state
        .tokens
        .verify_email_verification(&payload.token)
        .map_err(|_| ApiError::bad_request("Invalid or expired token"))?;

    let updated = state
        .db
        .users()
        .set_verified(&claims.id)
        .await
        .db_err("Failed to verify user")?;
    if !updated {
        return Err(ApiError::bad_request("User not found"));
    }

    info!(user_id = %claims.id, "Email verified");

    Ok((StatusCode::CREATED, message("Email verified!")))
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    #[serde(default)]
    email: String,
}

async fn forgot_password(
    State(state): State<AccountsState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = payload.email.trim();
    if !is_valid_email(email) {
        return Err(ApiError::bad_request("Invalid or missing email"));
    }

    let Some(user) = state
        .db
        .users()
        .get_by_email(email)
        .await
        .db_err("Failed to look up user")?
    else {
        return Ok((
            StatusCode::OK,
            message("If the email exists, a reset link will be sent"),
        ));
    };

    let token = state
        .tokens
        .issue_password_reset(&user.id)
        .internal_err("Failed to create reset token")?;
    state
        .mailer
        .send_password_reset(email, &token)
        .await
        .internal_err("Failed to send password reset email")?;

    Ok((StatusCode::CREATED, message("Password reset link sent")))
}

#[derive(Deserialize)]
struct ResetPasswordRequest {
    #[serde(default)]
    token: String,
    #[serde(default)]
    password: String,
}

async fn reset_password(
    State(state): State<AccountsState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.token.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Missing token or password"));
    }
    if payload.password.len() > MAX_PASSWORD_LENGTH {
        return Err(ApiError::Validation(vec!["Password is too long".to_string()]));
    }

    let claims = state
        .tokens
        .verify_password_reset(&payload.token)
        .map_err(|_| ApiError::bad_request("Invalid or expired token"))?;

    let user = state
        .db
        .users()
        .get_by_id(&claims.id)
        .await
        .db_err("Failed to look up user")?
        .ok_or_else(|| ApiError::bad_request("User not found"))?;

    let password_hash =
        hash_password(&payload.password).internal_err("Failed to hash password")?;
    state
        .db
        .users()
        .update_password(&user.id, &password_hash)
        .await
        .db_err("Failed to update password")?;

    info!(user_id = %user.id, "Password reset");

    Ok(message("Password updated successfully"))
}

async fn logout(State(state): State<AccountsState>) -> Response {
    let mut response = message("Logged out").into_response();
    append_set_cookies(response.headers_mut(), state.cookies.clear_session_cookies());
    response
}
