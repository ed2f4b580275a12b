//! Outgoing email for account verification and password resets.
//!
//! Delivery is a collaborator: the server only builds the links and hands
//! them to a `Mailer`. `LogMailer` writes them to the log.

use async_trait::async_trait;
use tracing::info;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to build link: {0}")]
    Link(#[from] url::ParseError),
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email_verification(&self, email: &str, token: &str) -> Result<(), MailError>;

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError>;
}

/// Build `{frontend_url}/{path}?token={token}`.
pub fn token_link(frontend_url: &Url, path: &str, token: &str) -> Result<Url, MailError> {
    let mut link = frontend_url.join(path)?;
    link.query_pairs_mut().append_pair("token", token);
    Ok(link)
}

/// Mailer that logs links instead of sending them.
pub struct LogMailer {
    frontend_url: Url,
}

impl LogMailer {
    pub fn new(frontend_url: Url) -> Self {
        Self { frontend_url }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email_verification(&self, email: &str, token: &str) -> Result<(), MailError> {
        let link = token_link(&self.frontend_url, "verify", token)?;
        info!(to = %email, link = %link, "Verification email");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError> {
        let link = token_link(&self.frontend_url, "reset-password", token)?;
        info!(to = %email, link = %link, "Password reset email");
        Ok(())
    }
}
