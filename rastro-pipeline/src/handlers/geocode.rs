use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;
use tracing::warn;

use crate::config::GeocodeConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::providers::Geocoder;

/// Resolves a street address for the position.
///
/// With `on_request` set, resolution is deferred to whoever consumes the
/// position later (a notification template, typically) and this stage
/// does nothing. Lookup failure leaves the address empty.
pub struct GeocodeHandler {
    geocoder: Option<Arc<dyn Geocoder>>,
    config: GeocodeConfig,
}

impl GeocodeHandler {
    pub fn new(geocoder: Option<Arc<dyn Geocoder>>, config: GeocodeConfig) -> Self {
        Self { geocoder, config }
    }
}

#[async_trait]
impl PositionHandler for GeocodeHandler {
    fn name(&self) -> &'static str {
        "geocode"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let Some(geocoder) = &self.geocoder else {
            return Ok(Outcome::Continue);
        };
        if self.config.on_request || position.address.is_some() {
            return Ok(Outcome::Continue);
        }

        match geocoder.address(position.latitude, position.longitude).await {
            Ok(address) => position.address = Some(address),
            Err(error) => warn!(
                device_id = ?position.device_id,
                error = %error,
                "Reverse geocoding failed"
            ),
        }

        Ok(Outcome::Continue)
    }
}
