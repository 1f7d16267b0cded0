use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;
use rastro_core::position::keys;

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Accumulates engine-on time, in milliseconds, while ignition stays on
/// across consecutive positions. Devices that report their own hours
/// counter are left alone.
pub struct EngineHoursHandler<S: Storage> {
    cache: Arc<DeviceCache<S>>,
}

impl<S: Storage> EngineHoursHandler<S> {
    pub fn new(cache: Arc<DeviceCache<S>>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for EngineHoursHandler<S> {
    fn name(&self) -> &'static str {
        "engine-hours"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        if position.has_attribute(keys::HOURS) {
            return Ok(Outcome::Continue);
        }

        let Some(last) = self.cache.last_position(position.device_id) else {
            return Ok(Outcome::Continue);
        };

        if position.boolean(keys::IGNITION) == Some(true)
            && last.boolean(keys::IGNITION) == Some(true)
        {
            let hours = last.double(keys::HOURS).unwrap_or(0.0)
                + position.fix_time.duration_since(last.fix_time).as_millis() as f64;
            position.set(keys::HOURS, hours);
        }

        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::DeviceId;

    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn hours_accumulate_while_ignition_on() {
        let cache = Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ));
        let handler = EngineHoursHandler::new(cache.clone());

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.set(keys::IGNITION, true);
        first.set(keys::HOURS, 1000.0);
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        second.set(keys::IGNITION, true);

        handler.handle(&mut second).await.unwrap();

        assert_eq!(second.double(keys::HOURS), Some(61_000.0));
    }

    #[tokio::test]
    async fn no_accumulation_when_ignition_off() {
        let cache = Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ));
        let handler = EngineHoursHandler::new(cache.clone());

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.set(keys::IGNITION, false);
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        second.set(keys::IGNITION, true);

        handler.handle(&mut second).await.unwrap();

        assert!(!second.has_attribute(keys::HOURS));
    }
}
