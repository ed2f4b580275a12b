//! Session and email token issuance and validation.
//!
//! Access and refresh tokens are signed with distinct secrets so a leaked
//! refresh secret can never mint access tokens and vice versa. Email tokens
//! (verification, password reset) use a third secret.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::User;

/// Token type, embedded as `typ` so one kind never validates as another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    EmailVerification,
    PasswordReset,
}

/// Claims carried by the short-lived access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// User id (UUID)
    pub id: String,
    pub email: Option<String>,
    pub display_name: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Claims carried by the long-lived refresh token. Only the user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Claims for single-purpose email tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailClaims {
    pub id: String,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    pub iat: u64,
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 30 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Email verification link duration: 1 day
pub const EMAIL_VERIFICATION_DURATION_SECS: u64 = 24 * 60 * 60;

/// Password reset link duration: 1 hour
pub const PASSWORD_RESET_DURATION_SECS: u64 = 60 * 60;

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// A freshly issued credential pair.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds (cookie Max-Age)
    pub access_duration: u64,
    /// Refresh token lifetime in seconds (cookie Max-Age)
    pub refresh_duration: u64,
}

/// Stateless token service over three signing secrets.
#[derive(Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    email: KeyPair,
    access_ttl: u64,
    refresh_ttl: u64,
}

impl TokenService {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8], email_secret: &[u8]) -> Self {
        Self {
            access: KeyPair::new(access_secret),
            refresh: KeyPair::new(refresh_secret),
            email: KeyPair::new(email_secret),
            access_ttl: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl: REFRESH_TOKEN_DURATION_SECS,
        }
    }

    /// Override the session token lifetimes (seconds).
    pub fn with_ttls(mut self, access_ttl: u64, refresh_ttl: u64) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Issue a new access + refresh token pair for a user.
    pub fn issue(&self, user: &User) -> Result<SessionTokens, JwtError> {
        let now = now_secs()?;

        let access = AccessClaims {
            id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            token_type: TokenType::Access,
            iat: now,
            exp: now + self.access_ttl,
        };
        let refresh = RefreshClaims {
            id: user.id.clone(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + self.refresh_ttl,
        };

        Ok(SessionTokens {
            access_token: encode(&access, &self.access)?,
            refresh_token: encode(&refresh, &self.refresh)?,
            access_duration: self.access_ttl,
            refresh_duration: self.refresh_ttl,
        })
    }

    /// Validate and decode an access token.
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let claims: AccessClaims = decode(token, &self.access)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate and decode a refresh token.
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let claims: RefreshClaims = decode(token, &self.refresh)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    pub fn issue_email_verification(&self, user_id: &str) -> Result<String, JwtError> {
        self.issue_email_token(
            user_id,
            TokenType::EmailVerification,
            EMAIL_VERIFICATION_DURATION_SECS,
        )
    }

    pub fn issue_password_reset(&self, user_id: &str) -> Result<String, JwtError> {
        self.issue_email_token(
            user_id,
            TokenType::PasswordReset,
            PASSWORD_RESET_DURATION_SECS,
        )
    }

    pub fn verify_email_verification(&self, token: &str) -> Result<EmailClaims, JwtError> {
        self.verify_email_token(token, TokenType::EmailVerification)
    }

    pub fn verify_password_reset(&self, token: &str) -> Result<EmailClaims, JwtError> {
        self.verify_email_token(token, TokenType::PasswordReset)
    }

    fn issue_email_token(
        &self,
        user_id: &str,
        token_type: TokenType,
        duration: u64,
    ) -> Result<String, JwtError> {
        let now = now_secs()?;
        let claims = EmailClaims {
            id: user_id.to_string(),
            token_type,
            iat: now,
            exp: now + duration,
        };
        encode(&claims, &self.email)
    }

    fn verify_email_token(
        &self,
        token: &str,
        expected: TokenType,
    ) -> Result<EmailClaims, JwtError> {
        let claims: EmailClaims = decode(token, &self.email)?;
        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }
}

fn now_secs() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

fn encode<T: Serialize>(claims: &T, keys: &KeyPair) -> Result<String, JwtError> {
    jsonwebtoken::encode(&Header::default(), claims, &keys.encoding).map_err(JwtError::Encoding)
}

fn decode<T: DeserializeOwned>(token: &str, keys: &KeyPair) -> Result<T, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    jsonwebtoken::decode::<T>(token, &keys.decoding, &validation)
        .map(|data| data.claims)
        .map_err(JwtError::Decoding)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Bad signature, malformed token or expired
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Token of another kind (e.g. refresh token presented as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
