use std::net::IpAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::chain::GeoChain;
use crate::db::{Database, LocationSeed};

/// Search radius given to users whose location was seeded from their IP.
pub const DEFAULT_SEARCH_RADIUS_M: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestEffortOutcome {
    NoPublicIp,
    AlreadySet,
    NoResult,
    Stored,
    Failed,
}

/// Seeds a user's location from their IP if they have none.
#[derive(Clone)]
pub struct GeoLocator {
    chain: Arc<GeoChain>,
    db: Database,
    default_radius_m: i64,
}

impl GeoLocator {
    pub fn new(chain: Arc<GeoChain>, db: Database) -> Self {
        Self {
            chain,
            db,
            default_radius_m: DEFAULT_SEARCH_RADIUS_M,
        }
    }

    /// Resolve and store. Never fails: every error is logged and reported
    /// as an outcome.
    pub async fn best_effort(&self, user_id: &str, ip: Option<IpAddr>) -> BestEffortOutcome {
        let Some(ip) = ip else {
            debug!(user_id, "No public client IP, skipping geolocation");
            return BestEffortOutcome::NoPublicIp;
        };

        // Cheap pre-check so known users cost no external requests
        match self.db.users().geo_status(user_id).await {
            Ok(status) if status.has_location => return BestEffortOutcome::AlreadySet,
            Ok(_) => {}
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read geo status");
                return BestEffortOutcome::Failed;
            }
        }

        let Some(geo) = self.chain.resolve(ip).await else {
            debug!(user_id, %ip, "No provider could locate IP");
            return BestEffortOutcome::NoResult;
        };

        let seed = LocationSeed {
            user_id,
            lat: geo.lat,
            lng: geo.lng,
            address: geo.address.as_deref(),
            default_radius_m: self.default_radius_m,
        };

        match self.db.users().set_location_if_empty(&seed).await {
            Ok(true) => {
                info!(user_id, lat = geo.lat, lng = geo.lng, "Seeded user location from IP");
                BestEffortOutcome::Stored
            }
            // Someone set it while we were looking it up
            Ok(false) => BestEffortOutcome::AlreadySet,
            Err(e) => {
                warn!(user_id, error = %e, "Failed to store location");
                BestEffortOutcome::Failed
            }
        }
    }

    /// Run `best_effort` as a detached task.
    pub fn spawn_best_effort(
        &self,
        user_id: String,
        ip: Option<IpAddr>,
    ) -> JoinHandle<BestEffortOutcome> {
        let locator = self.clone();
        tokio::spawn(async move { locator.best_effort(&user_id, ip).await })
    }
}
