use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rastro_core::position::keys;
use rastro_core::{Network, Position};
use tracing::{debug, warn};

use crate::config::GeolocationConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::providers::{GeolocationProvider, LbsFix};

/// Resolves coordinates from the reported radio environment when a fix
/// has none of its own.
///
/// Resolved environments are cached: a parked device on one cell tower
/// reports the same towers for hours, and each provider call costs
/// money. Lookup failure is not fatal; the position continues with its
/// original coordinates.
pub struct GeolocationHandler {
    provider: Option<Arc<dyn GeolocationProvider>>,
    config: GeolocationConfig,
    resolved: DashMap<Network, (LbsFix, jiff::Timestamp)>,
}

impl GeolocationHandler {
    pub fn new(provider: Option<Arc<dyn GeolocationProvider>>, config: GeolocationConfig) -> Self {
        Self {
            provider,
            config,
            resolved: DashMap::new(),
        }
    }

    fn cached(&self, network: &Network) -> Option<LbsFix> {
        let entry = self.resolved.get(network)?;
        let (fix, inserted) = *entry;
        if jiff::Timestamp::now().duration_since(inserted) < self.config.cache_ttl() {
            Some(fix)
        } else {
            drop(entry);
            self.resolved.remove(network);
            None
        }
    }

    fn apply(position: &mut Position, fix: LbsFix) {
        position.set(keys::APPROXIMATE, true);
        position.valid = true;
        position.fix_time = position.device_time;
        position.latitude = fix.latitude;
        position.longitude = fix.longitude;
        position.accuracy = fix.accuracy;
        position.altitude = 0.0;
        position.speed = 0.0;
        position.course = 0.0;
    }
}

#[async_trait]
impl PositionHandler for GeolocationHandler {
    fn name(&self) -> &'static str {
        "geolocation"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let Some(provider) = &self.provider else {
            return Ok(Outcome::Continue);
        };

        let needs_resolution =
            position.outdated || (self.config.process_invalid && !position.valid);
        let Some(network) = position.network.clone().filter(|_| needs_resolution) else {
            return Ok(Outcome::Continue);
        };

        if let Some(fix) = self.cached(&network) {
            debug!(device_id = ?position.device_id, "LBS cache hit");
            Self::apply(position, fix);
            return Ok(Outcome::Continue);
        }

        match provider.locate(&network).await {
            Ok(fix) => {
                self.resolved
                    .insert(network, (fix, jiff::Timestamp::now()));
                Self::apply(position, fix);
            }
            Err(error) => {
                warn!(
                    device_id = ?position.device_id,
                    error = %error,
                    "Geolocation lookup failed"
                );
            }
        }

        Ok(Outcome::Continue)
    }
}
