//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::geo::GeoChain;
use crate::mailer::LogMailer;
use crate::rate_limit::RateLimits;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use url::Url;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "helpnear",
    about = "Authentication and location seeding for a neighbourhood help app"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DATABASE", default_value = "helpnear.db")]
    pub database: String,

    /// Production mode: Secure cookies with SameSite=None, trusts one proxy hop by default
    #[arg(long, env = "PRODUCTION")]
    pub production: bool,

    /// Cookie Domain attribute (production only)
    #[arg(long, env = "COOKIE_DOMAIN")]
    pub cookie_domain: Option<String>,

    /// Frontend URL used to build verification and password reset links
    #[arg(long, env = "FE_URL", default_value = "http://localhost:5173")]
    pub frontend_url: String,

    /// Reverse proxies in front of the server. Defaults to 1 in production, 0 otherwise
    #[arg(long, env = "TRUST_PROXY_HOPS")]
    pub trust_proxy_hops: Option<usize>,

    /// Timeout for each geolocation provider request, in seconds
    #[arg(long, env = "GEO_TIMEOUT_SECS", default_value = "10")]
    pub geo_timeout_secs: u64,

    /// Disable IP geolocation entirely
    #[arg(long)]
    pub no_geo: bool,

    /// Path to file containing the access token secret. Prefer JWT_SECRET
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Path to file containing the email token secret. Prefer EMAIL_SECRET
    #[arg(long)]
    pub email_secret_file: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from an environment variable or a file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_name: &str, file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_name) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_name) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable or use the matching --*-secret-file option",
            env_name
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_name, MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

pub struct Secrets {
    pub jwt: String,
    pub refresh: String,
    pub email: String,
}

/// Load all three signing secrets. Access and refresh secrets must differ.
pub fn load_secrets(args: &Args) -> Option<Secrets> {
    let jwt = load_secret("JWT_SECRET", args.jwt_secret_file.as_deref())?;
    let refresh = load_secret("REFRESH_TOKEN_SECRET", args.refresh_secret_file.as_deref())?;
    let email = load_secret("EMAIL_SECRET", args.email_secret_file.as_deref())?;

    if jwt == refresh {
        error!("JWT_SECRET and REFRESH_TOKEN_SECRET must be different");
        return None;
    }

    Some(Secrets {
        jwt,
        refresh,
        email,
    })
}

/// Parse the frontend URL. Production requires HTTPS.
/// The path always ends in '/' so links can be joined onto it.
pub fn validate_frontend_url(frontend_url: &str, production: bool) -> Option<Url> {
    let mut url = match Url::parse(frontend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %frontend_url, error = %e, "Invalid frontend URL");
            return None;
        }
    };

    if production && url.scheme() != "https" {
        error!("Frontend URL must use HTTPS in production");
        return None;
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Some(url)
}

/// Build the geolocation chain. Runs in a secure context in production so
/// plaintext providers are never used there.
pub fn build_geo_chain(args: &Args) -> Option<GeoChain> {
    if args.no_geo {
        info!("IP geolocation disabled");
        return Some(GeoChain::empty());
    }

    let client = match reqwest::Client::builder()
        .user_agent(concat!("helpnear/", env!("CARGO_PKG_VERSION")))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return None;
        }
    };

    let timeout = Duration::from_secs(args.geo_timeout_secs.max(1));
    Some(
        GeoChain::new(GeoChain::default_providers(client), timeout)
            .with_secure_context(args.production),
    )
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    secrets: Secrets,
    frontend_url: Url,
    geo: GeoChain,
) -> ServerConfig {
    let trust_proxy_hops = args
        .trust_proxy_hops
        .unwrap_or(if args.production { 1 } else { 0 });

    if args.cookie_domain.is_some() && !args.production {
        warn!("--cookie-domain is ignored outside production");
    }

    ServerConfig {
        db,
        jwt_secret: secrets.jwt.into_bytes(),
        refresh_secret: secrets.refresh.into_bytes(),
        email_secret: secrets.email.into_bytes(),
        production: args.production,
        cookie_domain: args.cookie_domain.clone(),
        trust_proxy_hops,
        geo: Arc::new(geo),
        mailer: Arc::new(LogMailer::new(frontend_url)),
        rate_limits: RateLimits::default(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
