//! Geolocation provider abstraction.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Approximate location of an IP address. Coordinates are always finite.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoResult {
    pub lat: f64,
    pub lng: f64,
    pub address: Option<String>,
}

impl GeoResult {
    /// Returns `None` unless both coordinates are finite.
    pub fn new(lat: f64, lng: f64, address: Option<String>) -> Option<Self> {
        if lat.is_finite() && lng.is_finite() {
            Some(Self { lat, lng, address })
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("provider reported failure: {0}")]
    Failed(String),
}

impl From<reqwest::Error> for GeoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeoError::Timeout
        } else if e.is_decode() {
            GeoError::Malformed(e.to_string())
        } else {
            GeoError::Http(e)
        }
    }
}

/// One third-party IP geolocation service.
#[async_trait]
pub trait GeoProvider: Send + Sync {
    /// Provider name (for logs).
    fn name(&self) -> &'static str;

    /// Plaintext HTTP only. Skipped when the chain runs in a secure context.
    fn is_plaintext(&self) -> bool {
        false
    }

    async fn lookup(&self, ip: IpAddr, timeout: Duration) -> Result<GeoResult, GeoError>;
}

/// Join the non-empty parts with ", ", or `None` if nothing is left.
pub fn address_from_parts(parts: &[Option<&str>]) -> Option<String> {
    let parts: Vec<&str> = parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// GET a JSON document with a per-request timeout. Non-2xx is an error.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<T, GeoError> {
    let response = client.get(url).timeout(timeout).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(GeoError::Status(status.as_u16()));
    }

    Ok(response.json::<T>().await?)
}

/// Validate coordinates from a provider response.
pub(crate) fn coordinates(
    lat: Option<f64>,
    lng: Option<f64>,
    address: Option<String>,
) -> Result<GeoResult, GeoError> {
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return Err(GeoError::Malformed("missing coordinates".into()));
    };
    GeoResult::new(lat, lng, address)
        .ok_or_else(|| GeoError::Malformed("non-finite coordinates".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_result_rejects_non_finite() {
        assert!(GeoResult::new(f64::NAN, 1.0, None).is_none());
        assert!(GeoResult::new(1.0, f64::NEG_INFINITY, None).is_none());
        assert!(GeoResult::new(37.4, -122.1, None).is_some());
    }

    #[test]
    fn test_address_from_parts() {
        assert_eq!(
            address_from_parts(&[Some("94043"), Some("Mountain View"), None, Some("US")]),
            Some("94043, Mountain View, US".to_string())
        );
        assert_eq!(address_from_parts(&[Some(""), None, Some("  ")]), None);
        assert_eq!(address_from_parts(&[]), None);
    }

    #[test]
    fn test_coordinates() {
        assert!(matches!(
            coordinates(None, Some(1.0), None),
            Err(GeoError::Malformed(_))
        ));
        assert!(matches!(
            coordinates(Some(f64::NAN), Some(1.0), None),
            Err(GeoError::Malformed(_))
        ));
        assert_eq!(
            coordinates(Some(1.0), Some(2.0), None).unwrap(),
            GeoResult {
                lat: 1.0,
                lng: 2.0,
                address: None
            }
        );
    }
}
