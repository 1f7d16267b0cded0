use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::storage::Storage;

/// Fires when the driver badge id differs from the last known one.
pub struct DriverDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
}

impl<S: Storage> DriverDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for DriverDetector<S> {
    fn name(&self) -> &'static str {
        "driver"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) {
            return Ok(Vec::new());
        }

        let Some(current) = position.string(keys::DRIVER_UNIQUE_ID) else {
            return Ok(Vec::new());
        };
        let previous = last
            .as_ref()
            .and_then(|last| last.string(keys::DRIVER_UNIQUE_ID));

        if previous == Some(current) {
            return Ok(Vec::new());
        }

        let mut event = Event::new(
            event::TYPE_DRIVER_CHANGED,
            position.device_id,
            position.id,
            position.fix_time,
        );
        event.set(keys::DRIVER_UNIQUE_ID, current);
        Ok(vec![event])
    }
}
