use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::storage::Storage;

/// Diffs the geofence membership list against the previous position and
/// emits enter/exit events. Exit events carry the dwell duration when
/// the matching enter was observed in this process lifetime.
pub struct GeofenceDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
}

impl<S: Storage> GeofenceDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for GeofenceDetector<S> {
    fn name(&self) -> &'static str {
        "geofence"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) {
            return Ok(Vec::new());
        }

        let previous = last
            .as_ref()
            .map(|last| last.geofence_ids.as_slice())
            .unwrap_or_default();

        let mut events = Vec::new();

        self.cache.with_runtime(position.device_id, |state| {
            for id in &position.geofence_ids {
                if !previous.contains(id) {
                    state.geofence_entered.insert(*id, position.fix_time);
                    let mut event = Event::new(
                        event::TYPE_GEOFENCE_ENTER,
                        position.device_id,
                        position.id,
                        position.fix_time,
                    );
                    event.geofence_id = *id;
                    events.push(event);
                }
            }

            for id in previous {
                if !position.geofence_ids.contains(id) {
                    let mut event = Event::new(
                        event::TYPE_GEOFENCE_EXIT,
                        position.device_id,
                        position.id,
                        position.fix_time,
                    );
                    event.geofence_id = *id;
                    if let Some(entered) = state.geofence_entered.remove(id) {
                        let dwell = position.fix_time.duration_since(entered);
                        event.set(keys::DWELL_TIME, dwell.as_millis() as i64);
                    }
                    events.push(event);
                }
            }
        });

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::{DeviceId, GeofenceId};

    use crate::storage::memory::MemoryStorage;

    fn cache() -> Arc<DeviceCache<MemoryStorage>> {
        Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ))
    }

    #[tokio::test]
    async fn enter_and_exit_with_dwell() {
        let cache = cache();
        let detector = GeofenceDetector::new(cache.clone());

        // Enter fence 7.
        let mut inside = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        inside.geofence_ids = vec![GeofenceId(7)];

        let events = detector.analyze(&inside).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event::TYPE_GEOFENCE_ENTER);
        assert_eq!(events[0].geofence_id, GeofenceId(7));

        cache.set_last_position(inside);

        // Leave it ten minutes later.
        let outside = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(600).unwrap(),
        );
        let events = detector.analyze(&outside).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event::TYPE_GEOFENCE_EXIT);
        assert_eq!(events[0].integer(keys::DWELL_TIME), Some(600_000));
    }

    #[tokio::test]
    async fn unchanged_membership_is_silent() {
        let cache = cache();
        let detector = GeofenceDetector::new(cache.clone());

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.geofence_ids = vec![GeofenceId(7)];
        detector.analyze(&first).await.unwrap();
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        second.geofence_ids = vec![GeofenceId(7)];
        assert!(detector.analyze(&second).await.unwrap().is_empty());
    }
}
