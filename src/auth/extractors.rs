//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::cookie::{ACCESS_COOKIE_NAME, get_cookie};
use super::errors::ApiAuthError;
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;

/// Extractor for endpoints that require a valid access token.
///
/// Stateless: only the signature, type and expiry of the `token` cookie are
/// checked. Expired access tokens are renewed by the client through
/// `/refresh-token`, never here.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token =
            get_cookie(&parts.headers, ACCESS_COOKIE_NAME).ok_or(ApiAuthError::NotAuthenticated)?;

        let claims = state.tokens().verify_access(token).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            ApiAuthError::InvalidToken
        })?;

        Ok(Auth(AuthenticatedUser { claims }))
    }
}
