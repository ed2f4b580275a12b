#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, Response, header},
};
use helpnear::{
    ServerConfig, create_app,
    db::Database,
    geo::GeoChain,
    mailer::{MailError, Mailer},
    password::hash_password,
    rate_limit::RateLimits,
};
use serde_json::Value;
use tower::ServiceExt;

pub const JWT_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const EMAIL_SECRET: &[u8] = b"test-email-secret-0123456789abcdef";

pub const TEST_PASSWORD: &str = "correct horse battery staple";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailKind {
    Verification,
    PasswordReset,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub kind: MailKind,
    pub email: String,
    pub token: String,
}

/// Mailer that keeps every message in memory.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    /// Reject every following message with a delivery error.
    pub fn fail_deliveries(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_token(&self, kind: MailKind) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.kind == kind)
            .map(|m| m.token)
    }

    fn record(&self, kind: MailKind, email: &str, token: &str) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Delivery("mail server unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(SentMail {
            kind,
            email: email.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_email_verification(&self, email: &str, token: &str) -> Result<(), MailError> {
        self.record(MailKind::Verification, email, token)
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError> {
        self.record(MailKind::PasswordReset, email, token)
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Builder for an app backed by an in-memory database.
pub struct TestSetup {
    geo: GeoChain,
    rate_limits: RateLimits,
    production: bool,
    trust_proxy_hops: usize,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            geo: GeoChain::empty(),
            rate_limits: RateLimits {
                register: 100,
                login: 100,
                forgot_password: 100,
            },
            production: false,
            trust_proxy_hops: 0,
        }
    }

    pub fn geo(mut self, geo: GeoChain) -> Self {
        self.geo = geo;
        self
    }

    pub fn rate_limits(mut self, rate_limits: RateLimits) -> Self {
        self.rate_limits = rate_limits;
        self
    }

    pub fn production(mut self) -> Self {
        self.production = true;
        self
    }

    pub async fn config(self) -> (ServerConfig, Arc<RecordingMailer>) {
        let db = Database::open(":memory:").await.unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let config = ServerConfig {
            db,
            jwt_secret: JWT_SECRET.to_vec(),
            refresh_secret: REFRESH_SECRET.to_vec(),
            email_secret: EMAIL_SECRET.to_vec(),
            production: self.production,
            cookie_domain: None,
            trust_proxy_hops: self.trust_proxy_hops,
            geo: Arc::new(self.geo),
            mailer: mailer.clone(),
            rate_limits: self.rate_limits,
        };
        (config, mailer)
    }

    pub async fn build(self) -> TestApp {
        let (config, mailer) = self.config().await;
        TestApp {
            router: create_app(&config),
            db: config.db.clone(),
            mailer,
        }
    }
}

pub async fn create_test_app() -> TestApp {
    TestSetup::new().build().await
}

/// Address the test requests appear to come from.
pub fn loopback() -> SocketAddr {
    "127.0.0.1:40000".parse().unwrap()
}

/// Build a request as the server would see it behind `into_make_service_with_connect_info`.
pub fn request(method: &str, uri: &str, body: Option<Value>, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if body.is_some() {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    let mut request = builder.body(body).unwrap();
    request.extensions_mut().insert(ConnectInfo(loopback()));
    request
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    request("POST", uri, Some(body), None)
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// The raw Set-Cookie line for `name`.
pub fn find_cookie<'a>(cookies: &'a [String], name: &str) -> Option<&'a str> {
    let prefix = format!("{}=", name);
    cookies
        .iter()
        .find(|c| c.starts_with(&prefix))
        .map(String::as_str)
}

/// The value part of the Set-Cookie line for `name`.
pub fn cookie_value(cookies: &[String], name: &str) -> Option<String> {
    let line = find_cookie(cookies, name)?;
    let pair = line.split(';').next()?;
    pair.split_once('=').map(|(_, v)| v.to_string())
}

pub async fn create_verified_user(db: &Database, email: &str, display_name: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string();
    let hash = hash_password(TEST_PASSWORD).unwrap();
    db.users()
        .create(&id, email, display_name, &hash)
        .await
        .unwrap();
    assert!(db.users().set_verified(&id).await.unwrap());
    id
}

pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub cookies: Vec<String>,
}

impl Session {
    pub fn access_cookie(&self) -> String {
        format!("token={}", self.access_token)
    }

    pub fn refresh_cookie(&self) -> String {
        format!("refreshToken={}", self.refresh_token)
    }
}

pub async fn login(app: &TestApp, email: &str, password: &str) -> Session {
    let response = app
        .send(post_json(
            "/login",
            serde_json::json!({ "email": email, "password": password }),
        ))
        .await;
    assert_eq!(response.status(), 200);

    let cookies = set_cookies(&response);
    Session {
        access_token: cookie_value(&cookies, "token").unwrap(),
        refresh_token: cookie_value(&cookies, "refreshToken").unwrap(),
        cookies,
    }
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
