//! Session cookie names, parsing and placement.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::jwt::SessionTokens;

/// Cookie name for the access token (short-lived, 15 minutes).
pub const ACCESS_COOKIE_NAME: &str = "token";

/// Cookie name for the refresh token (long-lived, 30 days).
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// The refresh cookie is only ever sent to the renewal endpoint.
pub const REFRESH_COOKIE_PATH: &str = "/refresh-token";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Attributes shared by both session cookies.
///
/// In production cookies are `Secure; SameSite=None` (the frontend lives on
/// another origin) and may carry a `Domain`. Otherwise `SameSite=Lax`.
#[derive(Debug, Clone, Default)]
pub struct CookiePolicy {
    pub production: bool,
    pub domain: Option<String>,
}

impl CookiePolicy {
    pub fn new(production: bool, domain: Option<String>) -> Self {
        Self { production, domain }
    }

    fn build(&self, name: &str, value: &str, path: &str, max_age: u64) -> String {
        let mut cookie = format!(
            "{}={}; HttpOnly; Path={}; Max-Age={}",
            name, value, path, max_age
        );
        if self.production {
            cookie.push_str("; Secure; SameSite=None");
            if let Some(domain) = &self.domain {
                cookie.push_str("; Domain=");
                cookie.push_str(domain);
            }
        } else {
            cookie.push_str("; SameSite=Lax");
        }
        cookie
    }

    /// `Set-Cookie` values for a freshly issued pair: access first, refresh second.
    pub fn inject_session_cookies(&self, tokens: &SessionTokens) -> [String; 2] {
        [
            self.build(
                ACCESS_COOKIE_NAME,
                &tokens.access_token,
                "/",
                tokens.access_duration,
            ),
            self.build(
                REFRESH_COOKIE_NAME,
                &tokens.refresh_token,
                REFRESH_COOKIE_PATH,
                tokens.refresh_duration,
            ),
        ]
    }

    /// Expire both cookies. Path and domain must match the originals.
    pub fn clear_session_cookies(&self) -> [String; 2] {
        [
            self.build(ACCESS_COOKIE_NAME, "", "/", 0),
            self.build(REFRESH_COOKIE_NAME, "", REFRESH_COOKIE_PATH, 0),
        ]
    }
}

/// Append `Set-Cookie` headers, skipping values that are not valid header text.
pub fn append_set_cookies(headers: &mut HeaderMap, cookies: [String; 2]) {
    for cookie in cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!(error = %e, "Invalid Set-Cookie value"),
        }
    }
}
