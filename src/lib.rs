pub mod api;
pub mod auth;
pub mod cli;
pub mod db;
pub mod geo;
pub mod jwt;
pub mod mailer;
pub mod password;
pub mod rate_limit;
pub mod session_refresh;

use api::{ApiContext, create_api_router};
use auth::CookiePolicy;
use axum::{Router, routing::get};
use db::Database;
use geo::{GeoChain, GeoLocator};
use jwt::TokenService;
use mailer::Mailer;
use rate_limit::{RateLimitConfig, RateLimits};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub jwt_secret: Vec<u8>,
    /// Secret for signing refresh tokens (must differ from `jwt_secret`)
    pub refresh_secret: Vec<u8>,
    /// Secret for signing email verification and password reset tokens
    pub email_secret: Vec<u8>,
    /// Production cookies: Secure, SameSite=None, optional Domain
    pub production: bool,
    /// Cookie Domain attribute, only used in production
    pub cookie_domain: Option<String>,
    /// Number of reverse proxies in front of the server
    pub trust_proxy_hops: usize,
    /// IP geolocation providers
    pub geo: Arc<GeoChain>,
    /// Outgoing email
    pub mailer: Arc<dyn Mailer>,
    /// Per-IP limits on the auth endpoints
    pub rate_limits: RateLimits,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let tokens = Arc::new(TokenService::new(
        &config.jwt_secret,
        &config.refresh_secret,
        &config.email_secret,
    ));

    let ctx = ApiContext {
        db: config.db.clone(),
        tokens,
        cookies: CookiePolicy::new(config.production, config.cookie_domain.clone()),
        mailer: config.mailer.clone(),
        geo: GeoLocator::new(config.geo.clone(), config.db.clone()),
        trust_proxy_hops: config.trust_proxy_hops,
        rate_limit_config: Arc::new(RateLimitConfig::new(
            config.rate_limits,
            config.trust_proxy_hops,
        )),
    };

    Router::new()
        .route("/", get(|| async { "Auth server is running!" }))
        .merge(create_api_router(ctx))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
