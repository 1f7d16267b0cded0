use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;

use crate::cache::DeviceCache;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Per-device attribute that extends the configured copy list.
const COPY_ATTRIBUTES_KEY: &str = "processing.copyAttributes";

/// Carries configured attributes forward from the last stored position.
/// Trackers send some values (driver badge, configuration flags) only
/// when they change; copying them forward keeps every stored position
/// self-contained.
pub struct CopyAttributesHandler<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    keys: Vec<String>,
}

impl<S: Storage> CopyAttributesHandler<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, keys: Vec<String>) -> Self {
        Self { cache, keys }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for CopyAttributesHandler<S> {
    fn name(&self) -> &'static str {
        "copy-attributes"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let Some(last) = self.cache.last_position(position.device_id) else {
            return Ok(Outcome::Continue);
        };

        let device_keys = self
            .cache
            .lookup_string(position.device_id, COPY_ATTRIBUTES_KEY)
            .unwrap_or_default();

        let keys = self.keys.iter().map(String::as_str).chain(
            device_keys
                .split([' ', ','])
                .filter(|key| !key.is_empty()),
        );

        for key in keys {
            if !position.attributes.contains_key(key)
                && let Some(value) = last.attributes.get(key)
            {
                position.attributes.insert(key.to_owned(), value.clone());
            }
        }

        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::DeviceId;
    use rastro_core::position::keys;

    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn absent_attribute_is_copied_forward() {
        let cache = Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ));
        let handler = CopyAttributesHandler::new(
            cache.clone(),
            vec![keys::DRIVER_UNIQUE_ID.to_owned()],
        );

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.set(keys::DRIVER_UNIQUE_ID, "AB12");
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        handler.handle(&mut second).await.unwrap();

        assert_eq!(second.string(keys::DRIVER_UNIQUE_ID), Some("AB12"));
    }

    #[tokio::test]
    async fn present_attribute_is_not_overwritten() {
        let cache = Arc::new(DeviceCache::new(
            Arc::new(MemoryStorage::default()),
            Default::default(),
        ));
        let handler = CopyAttributesHandler::new(
            cache.clone(),
            vec![keys::DRIVER_UNIQUE_ID.to_owned()],
        );

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.set(keys::DRIVER_UNIQUE_ID, "AB12");
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(60).unwrap(),
        );
        second.set(keys::DRIVER_UNIQUE_ID, "CD34");
        handler.handle(&mut second).await.unwrap();

        assert_eq!(second.string(keys::DRIVER_UNIQUE_ID), Some("CD34"));
    }
}
