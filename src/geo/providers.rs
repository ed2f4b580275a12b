//! Concrete IP geolocation services, in the order the chain tries them.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::provider::{
    GeoError, GeoProvider, GeoResult, address_from_parts, coordinates, fetch_json,
};

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// ipwho.is (HTTPS, no key).
pub struct IpWhoIs {
    client: reqwest::Client,
    base_url: String,
}

impl IpWhoIs {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, "https://ipwho.is")
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Deserialize)]
struct IpWhoIsResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    postal: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

#[async_trait]
impl GeoProvider for IpWhoIs {
    fn name(&self) -> &'static str {
        "ipwho.is"
    }

    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<GeoResult, GeoError> {
        let url = format!(
            "{}/{}?fields=success,message,latitude,longitude,city,region,country,postal",
            self.base_url, ip
        );
        let q: IpWhoIsResponse = fetch_json(&self.client, &url, timeout).await?;

        if !q.success {
            return Err(GeoError::Failed(
                q.message.unwrap_or_else(|| "success=false".into()),
            ));
        }

        let address = address_from_parts(&[
            q.postal.as_deref(),
            q.city.as_deref(),
            q.region.as_deref(),
            q.country.as_deref(),
        ]);
        coordinates(q.latitude, q.longitude, address)
    }
}

/// ipapi.co (HTTPS, no key).
pub struct IpApiCo {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiCo {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, "https://ipapi.co")
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Deserialize)]
struct IpApiCoResponse {
    #[serde(default)]
    error: bool,
    reason: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    postal: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country_name: Option<String>,
}

#[async_trait]
impl GeoProvider for IpApiCo {
    fn name(&self) -> &'static str {
        "ipapi.co"
    }

    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<GeoResult, GeoError> {
        let url = format!("{}/{}/json/", self.base_url, ip);
        let q: IpApiCoResponse = fetch_json(&self.client, &url, timeout).await?;

        if q.error {
            return Err(GeoError::Failed(
                q.reason.unwrap_or_else(|| "error=true".into()),
            ));
        }

        let address = address_from_parts(&[
            q.postal.as_deref(),
            q.city.as_deref(),
            q.region.as_deref(),
            q.country_name.as_deref(),
        ]);
        coordinates(q.latitude, q.longitude, address)
    }
}

/// ip-api.com. The free tier is plaintext HTTP only.
pub struct IpApiCom {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiCom {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, "http://ip-api.com")
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiComResponse {
    status: Option<String>,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    zip: Option<String>,
    city: Option<String>,
    region_name: Option<String>,
    country: Option<String>,
}

#[async_trait]
impl GeoProvider for IpApiCom {
    fn name(&self) -> &'static str {
        "ip-api.com"
    }

    fn is_plaintext(&self) -> bool {
        true
    }

    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<GeoResult, GeoError> {
        let url = format!(
            "{}/json/{}?fields=status,message,lat,lon,city,regionName,country,zip",
            self.base_url, ip
        );
        let q: IpApiComResponse = fetch_json(&self.client, &url, timeout).await?;

        if q.status.as_deref() != Some("success") {
            return Err(GeoError::Failed(
                q.message.unwrap_or_else(|| "status!=success".into()),
            ));
        }

        let address = address_from_parts(&[
            q.zip.as_deref(),
            q.city.as_deref(),
            q.region_name.as_deref(),
            q.country.as_deref(),
        ]);
        coordinates(q.lat, q.lon, address)
    }
}

/// ipinfo.io (HTTPS, tiny anonymous quota). Coordinates come as `"lat,lng"`.
pub struct IpInfo {
    client: reqwest::Client,
    base_url: String,
}

impl IpInfo {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_base_url(client, "https://ipinfo.io")
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trim_base(base_url),
        }
    }
}

#[derive(Deserialize)]
struct IpInfoResponse {
    loc: Option<String>,
    postal: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

fn parse_loc(loc: &str) -> (Option<f64>, Option<f64>) {
    match loc.split_once(',') {
        Some((lat, lng)) => (lat.trim().parse().ok(), lng.trim().parse().ok()),
        None => (None, None),
    }
}

#[async_trait]
impl GeoProvider for IpInfo {
    fn name(&self) -> &'static str {
        "ipinfo.io"
    }

    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<GeoResult, GeoError> {
        let url = format!("{}/{}/json", self.base_url, ip);
        let q: IpInfoResponse = fetch_json(&self.client, &url, timeout).await?;

        let (lat, lng) = q.loc.as_deref().map(parse_loc).unwrap_or((None, None));

        let address = address_from_parts(&[
            q.postal.as_deref(),
            q.city.as_deref(),
            q.region.as_deref(),
            q.country.as_deref(),
        ]);
        coordinates(lat, lng, address)
    }
}
