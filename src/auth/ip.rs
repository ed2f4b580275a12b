//! Client IP extraction utilities.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

/// Trait for types that provide access to HTTP headers and extensions.
/// Implemented for both `Parts` and `Request` to allow flexible IP extraction.
pub trait HasHeadersAndExtensions {
    fn headers(&self) -> &axum::http::HeaderMap;
    fn extensions(&self) -> &axum::http::Extensions;
}

impl HasHeadersAndExtensions for Parts {
    fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }
    fn extensions(&self) -> &axum::http::Extensions {
        &self.extensions
    }
}

impl<B> HasHeadersAndExtensions for axum::extract::Request<B> {
    fn headers(&self) -> &axum::http::HeaderMap {
        axum::extract::Request::headers(self)
    }
    fn extensions(&self) -> &axum::http::Extensions {
        axum::extract::Request::extensions(self)
    }
}

/// Peer address of the TCP connection.
pub fn socket_ip<T: HasHeadersAndExtensions>(source: &T) -> Option<IpAddr> {
    source
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
}

/// Client address after trusting `trust_proxy_hops` reverse proxies.
///
/// Each trusted proxy appends the address it received the request from to
/// `X-Forwarded-For`, so the client is the entry `hops` positions from the
/// right. With fewer entries than hops the leftmost entry is used. With zero
/// hops the header is ignored and the socket address is returned.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    socket: Option<IpAddr>,
    trust_proxy_hops: usize,
) -> Option<IpAddr> {
    if trust_proxy_hops == 0 {
        return socket;
    }

    let forwarded: Vec<IpAddr> = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default();

    if forwarded.is_empty() {
        return socket;
    }

    let index = forwarded.len().saturating_sub(trust_proxy_hops);
    forwarded.get(index).copied()
}

/// `resolve_client_ip` for a request or request parts.
pub fn trusted_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_proxy_hops: usize,
) -> Option<IpAddr> {
    resolve_client_ip(source.headers(), socket_ip(source), trust_proxy_hops)
}

/// Extractor for the peer address. Never rejects: requests served without
/// `ConnectInfo` (e.g. in tests) yield `None`.
pub struct SocketIp(pub Option<IpAddr>);

impl<S: Send + Sync> FromRequestParts<S> for SocketIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SocketIp(socket_ip(parts)))
    }
}

/// Client IP as a string key (rate limiting).
pub fn extract_client_ip<T: HasHeadersAndExtensions>(
    source: &T,
    trust_proxy_hops: usize,
) -> Result<String, &'static str> {
    trusted_client_ip(source, trust_proxy_hops)
        .map(|ip| ip.to_string())
        .ok_or("No client IP available")
}
