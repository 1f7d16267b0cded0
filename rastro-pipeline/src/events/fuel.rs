use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::cache::DeviceCache;
use crate::config::FuelConfig;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::storage::Storage;

/// Flags abrupt fuel-level changes: a drop suggests theft or a sensor
/// fault, an increase is a refuel.
pub struct FuelDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    config: FuelConfig,
}

impl<S: Storage> FuelDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, config: FuelConfig) -> Self {
        Self { cache, config }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for FuelDetector<S> {
    fn name(&self) -> &'static str {
        "fuel"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) {
            return Ok(Vec::new());
        }

        let (Some(current), Some(previous)) = (
            position.double(keys::FUEL_LEVEL),
            last.as_ref().and_then(|last| last.double(keys::FUEL_LEVEL)),
        ) else {
            return Ok(Vec::new());
        };

        let delta = current - previous;
        let event_type = if self.config.drop_threshold > 0.0 && -delta >= self.config.drop_threshold
        {
            event::TYPE_FUEL_DROP
        } else if self.config.increase_threshold > 0.0 && delta >= self.config.increase_threshold {
            event::TYPE_FUEL_INCREASE
        } else {
            return Ok(Vec::new());
        };

        let mut event = Event::new(
            event_type,
            position.device_id,
            position.id,
            position.fix_time,
        );
        event.set(keys::FUEL_LEVEL, current);
        Ok(vec![event])
    }
}
