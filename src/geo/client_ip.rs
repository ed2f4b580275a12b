use std::net::IpAddr;

use axum::http::HeaderMap;

use super::eligibility::{is_public_ip, normalize_ip};
use crate::auth::resolve_client_ip;

/// Headers that may carry the original client address, checked in order.
/// Only the first one present is used.
const CLIENT_IP_HEADERS: [&str; 4] = [
    "x-forwarded-for",
    "x-real-ip",
    "x-client-ip",
    "cf-connecting-ip",
];

/// Find a public client address worth geolocating.
///
/// The proxy-trusted client address wins if it is public. Otherwise the
/// first present header among `CLIENT_IP_HEADERS` is split on commas and
/// scanned left to right; the socket address is scanned only when none of
/// those headers is present.
pub fn public_client_ip(
    headers: &HeaderMap,
    socket: Option<IpAddr>,
    trust_proxy_hops: usize,
) -> Option<IpAddr> {
    if let Some(ip) = resolve_client_ip(headers, socket, trust_proxy_hops).map(normalize_ip) {
        if is_public_ip(ip) {
            return Some(ip);
        }
    }

    let header = CLIENT_IP_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok());

    match header {
        Some(chain) => chain
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<IpAddr>().ok())
            .map(normalize_ip)
            .find(|ip| is_public_ip(*ip)),
        None => socket.map(normalize_ip).filter(|ip| is_public_ip(*ip)),
    }
}
