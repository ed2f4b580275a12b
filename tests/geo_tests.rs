mod common;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use common::{TEST_PASSWORD, TestSetup, create_verified_user, post_json, spawn_server};
use helpnear::geo::{
    BestEffortOutcome, GeoChain, GeoError, GeoLocator, GeoProvider, IpApiCo, IpApiCom, IpInfo,
    IpWhoIs,
};
use serde_json::json;

const GOOGLE_DNS: &str = "8.8.8.8";

/// Canned provider responses keyed by the first path segment.
async fn mock_provider(State(hits): State<Arc<AtomicUsize>>, uri: Uri) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    let prefix = uri.path().trim_start_matches('/').split('/').next().unwrap_or("");
    match prefix {
        "ipwho" => Json(json!({
            "success": true,
            "latitude": 37.4,
            "longitude": -122.1,
            "postal": "94043",
            "city": "Mountain View",
            "region": "California",
            "country": "United States",
        }))
        .into_response(),
        "ipwho-failed" => Json(json!({ "success": false, "message": "reserved range" }))
            .into_response(),
        "ipapi-co" => Json(json!({
            "latitude": 48.85,
            "longitude": 2.35,
            "city": "Paris",
            "country_name": "France",
        }))
        .into_response(),
        "ip-api" => Json(json!({
            "status": "success",
            "lat": 52.52,
            "lon": 13.4,
            "city": "Berlin",
            "country": "Germany",
        }))
        .into_response(),
        "ipinfo" => Json(json!({ "loc": "51.5,-0.12", "city": "London", "country": "GB" }))
            .into_response(),
        "nan" => Json(json!({ "loc": "NaN,1.0" })).into_response(),
        "bad-json" => "this is not json".into_response(),
        "error" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({ "success": true, "latitude": 1.0, "longitude": 1.0 })).into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

struct MockProviders {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    client: reqwest::Client,
}

impl MockProviders {
    async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let router = Router::new()
            .fallback(mock_provider)
            .with_state(hits.clone());
        Self {
            addr: spawn_server(router).await,
            hits,
            client: reqwest::Client::new(),
        }
    }

    fn base(&self, prefix: &str) -> String {
        format!("http://{}/{}", self.addr, prefix)
    }

    fn ipwho(&self, prefix: &str) -> Arc<dyn GeoProvider> {
        Arc::new(IpWhoIs::with_base_url(self.client.clone(), &self.base(prefix)))
    }

    fn ipinfo(&self, prefix: &str) -> Arc<dyn GeoProvider> {
        Arc::new(IpInfo::with_base_url(self.client.clone(), &self.base(prefix)))
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn google_dns() -> IpAddr {
    GOOGLE_DNS.parse().unwrap()
}

const TIMEOUT: Duration = Duration::from_millis(300);

#[tokio::test]
async fn test_each_provider_parses_its_format() {
    let mock = MockProviders::start().await;
    let ip = google_dns();

    let geo = IpWhoIs::with_base_url(mock.client.clone(), &mock.base("ipwho"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap();
    assert_eq!((geo.lat, geo.lng), (37.4, -122.1));
    assert_eq!(
        geo.address.as_deref(),
        Some("94043, Mountain View, California, United States")
    );

    let geo = IpApiCo::with_base_url(mock.client.clone(), &mock.base("ipapi-co"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap();
    assert_eq!((geo.lat, geo.lng), (48.85, 2.35));
    assert_eq!(geo.address.as_deref(), Some("Paris, France"));

    let geo = IpApiCom::with_base_url(mock.client.clone(), &mock.base("ip-api"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap();
    assert_eq!((geo.lat, geo.lng), (52.52, 13.4));

    let geo = IpInfo::with_base_url(mock.client.clone(), &mock.base("ipinfo"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap();
    assert_eq!((geo.lat, geo.lng), (51.5, -0.12));
    assert_eq!(geo.address.as_deref(), Some("London, GB"));
}

#[tokio::test]
async fn test_provider_failures_are_classified() {
    let mock = MockProviders::start().await;
    let ip = google_dns();

    let err = IpWhoIs::with_base_url(mock.client.clone(), &mock.base("ipwho-failed"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::Failed(ref m) if m == "reserved range"));

    let err = IpWhoIs::with_base_url(mock.client.clone(), &mock.base("error"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::Status(500)));

    let err = IpWhoIs::with_base_url(mock.client.clone(), &mock.base("bad-json"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::Malformed(_)));

    let err = IpInfo::with_base_url(mock.client.clone(), &mock.base("nan"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::Malformed(_)));

    let err = IpWhoIs::with_base_url(mock.client.clone(), &mock.base("slow"))
        .lookup(ip, TIMEOUT)
        .await
        .unwrap_err();
    assert!(matches!(err, GeoError::Timeout));
}

#[tokio::test]
async fn test_chain_skips_bad_providers() {
    let mock = MockProviders::start().await;

    let chain = GeoChain::new(
        vec![
            mock.ipwho("slow"),
            mock.ipwho("error"),
            mock.ipwho("bad-json"),
            mock.ipinfo("nan"),
            mock.ipinfo("ipinfo"),
            mock.ipwho("ipwho"),
        ],
        TIMEOUT,
    );

    let started = Instant::now();
    let geo = chain.resolve(google_dns()).await.unwrap();
    assert_eq!((geo.lat, geo.lng), (51.5, -0.12));
    assert!(started.elapsed() < Duration::from_secs(3));

    // The provider after the first success is never asked
    assert_eq!(mock.hits(), 5);
}

#[tokio::test]
async fn test_chain_all_fail() {
    let mock = MockProviders::start().await;
    let chain = GeoChain::new(
        vec![mock.ipwho("error"), mock.ipinfo("nan"), mock.ipwho("missing")],
        TIMEOUT,
    );
    assert!(chain.resolve(google_dns()).await.is_none());
    assert_eq!(mock.hits(), 3);
}

#[tokio::test]
async fn test_secure_context_skips_plaintext_provider() {
    let mock = MockProviders::start().await;
    let plaintext: Arc<dyn GeoProvider> = Arc::new(IpApiCom::with_base_url(
        mock.client.clone(),
        &mock.base("ip-api"),
    ));

    let chain = GeoChain::new(
        vec![plaintext.clone(), mock.ipwho("ipwho")],
        TIMEOUT,
    )
    .with_secure_context(true);
    let geo = chain.resolve(google_dns()).await.unwrap();
    assert_eq!((geo.lat, geo.lng), (37.4, -122.1));
    assert_eq!(mock.hits(), 1);

    let chain = GeoChain::new(vec![plaintext, mock.ipwho("ipwho")], TIMEOUT);
    let geo = chain.resolve(google_dns()).await.unwrap();
    assert_eq!((geo.lat, geo.lng), (52.52, 13.4));
}

#[tokio::test]
async fn test_locator_only_seeds_once() {
    let mock = MockProviders::start().await;
    let app = TestSetup::new().build().await;
    let id = create_verified_user(&app.db, "peggy@example.com", "Peggy").await;

    let chain = Arc::new(GeoChain::new(vec![mock.ipwho("ipwho")], TIMEOUT));
    let locator = GeoLocator::new(chain, app.db.clone());

    assert_eq!(
        locator.best_effort(&id, None).await,
        BestEffortOutcome::NoPublicIp
    );

    let (a, b) = tokio::join!(
        locator.best_effort(&id, Some(google_dns())),
        locator.best_effort(&id, Some(google_dns())),
    );
    let mut outcomes = [a, b];
    outcomes.sort_by_key(|o| *o == BestEffortOutcome::Stored);
    assert_eq!(
        outcomes,
        [BestEffortOutcome::AlreadySet, BestEffortOutcome::Stored]
    );

    // Known location costs no lookup
    let hits = mock.hits();
    assert_eq!(
        locator.best_effort(&id, Some(google_dns())).await,
        BestEffortOutcome::AlreadySet
    );
    assert_eq!(mock.hits(), hits);
}

#[tokio::test]
async fn test_login_seeds_location_from_forwarded_ip() {
    let mock = MockProviders::start().await;
    let app = TestSetup::new()
        .geo(GeoChain::new(vec![mock.ipwho("ipwho")], TIMEOUT))
        .build()
        .await;
    let id = create_verified_user(&app.db, "rupert@example.com", "Rupert").await;

    let mut request = post_json(
        "/login",
        json!({ "email": "rupert@example.com", "password": TEST_PASSWORD }),
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 8.8.8.8"));
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Geolocation runs after the response is sent
    let mut location = None;
    for _ in 0..100 {
        location = app.db.users().get_location(&id).await.unwrap();
        if location.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let location = location.expect("location was never seeded");
    assert_eq!((location.lat, location.lng), (37.4, -122.1));
    assert_eq!(location.radius_m, Some(10_000));
    assert_eq!(
        location.address.as_deref(),
        Some("94043, Mountain View, California, United States")
    );

    let status = app.db.users().geo_status(&id).await.unwrap();
    assert!(status.ready);
}

#[tokio::test]
async fn test_login_from_private_network_skips_lookup() {
    let mock = MockProviders::start().await;
    let app = TestSetup::new()
        .geo(GeoChain::new(vec![mock.ipwho("ipwho")], TIMEOUT))
        .build()
        .await;
    let id = create_verified_user(&app.db, "sybil@example.com", "Sybil").await;

    let mut request = post_json(
        "/login",
        json!({ "email": "sybil@example.com", "password": TEST_PASSWORD }),
    );
    request
        .headers_mut()
        .insert("x-forwarded-for", HeaderValue::from_static("192.168.1.20"));
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mock.hits(), 0);
    assert!(app.db.users().get_location(&id).await.unwrap().is_none());
}
