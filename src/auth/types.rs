use crate::jwt::AccessClaims;

/// Authenticated user information extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: AccessClaims,
}

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.claims.id
    }
}
