use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::{Event, Position, event};

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::storage::Storage;

/// Fires when a watched counter (odometer, engine hours) crosses a
/// service-interval boundary.
pub struct MaintenanceDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
}

impl<S: Storage> MaintenanceDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for MaintenanceDetector<S> {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) {
            return Ok(Vec::new());
        }
        let Some(last) = last else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();

        for maintenance in self.cache.maintenances(position.device_id) {
            if maintenance.period <= 0.0 {
                continue;
            }
            let (Some(new_value), Some(old_value)) = (
                position.double(&maintenance.attribute),
                last.double(&maintenance.attribute),
            ) else {
                continue;
            };
            if new_value < maintenance.start {
                continue;
            }

            let old_intervals =
                ((old_value - maintenance.start) / maintenance.period).floor();
            let new_intervals =
                ((new_value - maintenance.start) / maintenance.period).floor();

            if new_intervals > old_intervals {
                let mut event = Event::new(
                    event::TYPE_MAINTENANCE,
                    position.device_id,
                    position.id,
                    position.fix_time,
                );
                event.maintenance_id = maintenance.id;
                event.set(maintenance.attribute.as_str(), new_value);
                events.push(event);
            }
        }

        Ok(events)
    }
}
