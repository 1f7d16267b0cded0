use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::storage::Storage;

/// Detects ignition edges by comparing the ignition attribute against
/// the last known position.
pub struct IgnitionDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
}

impl<S: Storage> IgnitionDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for IgnitionDetector<S> {
    fn name(&self) -> &'static str {
        "ignition"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) {
            return Ok(Vec::new());
        }

        let (Some(current), Some(previous)) = (
            position.boolean(keys::IGNITION),
            last.as_ref().and_then(|last| last.boolean(keys::IGNITION)),
        ) else {
            return Ok(Vec::new());
        };

        if current == previous {
            return Ok(Vec::new());
        }

        let event_type = if current {
            event::TYPE_IGNITION_ON
        } else {
            event::TYPE_IGNITION_OFF
        };
        Ok(vec![Event::new(
            event_type,
            position.device_id,
            position.id,
            position.fix_time,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::DeviceId;

    use crate::storage::memory::MemoryStorage;

    fn cache() -> Arc<DeviceCache<MemoryStorage>> {
        Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ))
    }

    #[tokio::test]
    async fn edge_fires_event() {
        let cache = cache();
        let detector = IgnitionDetector::new(cache.clone());

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.set(keys::IGNITION, false);
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        second.set(keys::IGNITION, true);

        let events = detector.analyze(&second).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, event::TYPE_IGNITION_ON);
    }

    #[tokio::test]
    async fn no_event_without_edge() {
        let cache = cache();
        let detector = IgnitionDetector::new(cache.clone());

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.set(keys::IGNITION, true);
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        second.set(keys::IGNITION, true);

        assert!(detector.analyze(&second).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn out_of_order_fix_is_ignored() {
        let cache = cache();
        let detector = IgnitionDetector::new(cache.clone());

        let mut first = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(120).unwrap(),
        );
        first.set(keys::IGNITION, false);
        cache.set_last_position(first);

        let mut stale = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        stale.set(keys::IGNITION, true);

        assert!(detector.analyze(&stale).await.unwrap().is_empty());
    }
}
