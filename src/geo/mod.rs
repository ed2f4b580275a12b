//! Best-effort IP geolocation.
//!
//! A public client address is run through an ordered list of free
//! third-party lookup services. The first usable answer seeds the user's
//! location, but only if the user has none. Nothing here ever fails a
//! request.

mod chain;
mod client_ip;
mod eligibility;
mod locator;
mod provider;
mod providers;

pub use chain::{DEFAULT_LOOKUP_TIMEOUT, GeoChain};
pub use client_ip::public_client_ip;
pub use eligibility::{is_public_ip, normalize_ip};
pub use locator::{BestEffortOutcome, DEFAULT_SEARCH_RADIUS_M, GeoLocator};
pub use provider::{GeoError, GeoProvider, GeoResult, address_from_parts};
pub use providers::{IpApiCo, IpApiCom, IpInfo, IpWhoIs};
