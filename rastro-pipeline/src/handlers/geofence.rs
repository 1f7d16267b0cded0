use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Computes which geofences contain the position and attaches their ids.
pub struct GeofenceHandler<S: Storage> {
    cache: Arc<DeviceCache<S>>,
}

impl<S: Storage> GeofenceHandler<S> {
    pub fn new(cache: Arc<DeviceCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for GeofenceHandler<S> {
    fn name(&self) -> &'static str {
        "geofence"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let mut ids: Vec<_> = self
            .cache
            .geofences(position.device_id)
            .iter()
            .filter(|geofence| geofence.contains(position.latitude, position.longitude))
            .map(|geofence| geofence.id)
            .collect();
        ids.sort();
        position.geofence_ids = ids;
        Ok(Outcome::Continue)
    }
}
