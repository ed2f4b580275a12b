use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::provider::{GeoError, GeoProvider, GeoResult};
use super::providers::{IpApiCo, IpApiCom, IpInfo, IpWhoIs};

/// Per-request timeout for each provider.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Ordered list of providers, tried until one returns a usable result.
pub struct GeoChain {
    providers: Vec<Arc<dyn GeoProvider>>,
    timeout: Duration,
    secure_context: bool,
}

impl GeoChain {
    pub fn new(providers: Vec<Arc<dyn GeoProvider>>, timeout: Duration) -> Self {
        Self {
            providers,
            timeout,
            secure_context: false,
        }
    }

    /// A chain with no providers. Every lookup yields `None`.
    pub fn empty() -> Self {
        Self::new(Vec::new(), DEFAULT_LOOKUP_TIMEOUT)
    }

    /// The public services: ipwho.is, ipapi.co, ip-api.com, ipinfo.io.
    pub fn default_providers(client: reqwest::Client) -> Vec<Arc<dyn GeoProvider>> {
        vec![
            Arc::new(IpWhoIs::new(client.clone())),
            Arc::new(IpApiCo::new(client.clone())),
            Arc::new(IpApiCom::new(client.clone())),
            Arc::new(IpInfo::new(client)),
        ]
    }

    /// Skip plaintext-only providers.
    pub fn with_secure_context(mut self, secure_context: bool) -> Self {
        self.secure_context = secure_context;
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// First well-formed result wins. Failures are logged and never surface.
    pub async fn resolve(&self, ip: IpAddr) -> Option<GeoResult> {
        for provider in &self.providers {
            if self.secure_context && provider.is_plaintext() {
                debug!(provider = provider.name(), "Skipping plaintext provider");
                continue;
            }

            // Bound the whole lookup, not just the HTTP request.
            let result = match tokio::time::timeout(self.timeout, provider.lookup(ip, self.timeout))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(GeoError::Timeout),
            };

            match result {
                Ok(geo) => {
                    debug!(provider = provider.name(), %ip, lat = geo.lat, lng = geo.lng, "Resolved location");
                    return Some(geo);
                }
                Err(e) => {
                    debug!(provider = provider.name(), %ip, error = %e, "Geo lookup failed");
                }
            }
        }

        None
    }
}
