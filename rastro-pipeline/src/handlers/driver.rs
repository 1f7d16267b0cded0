use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;
use rastro_core::position::keys;
use tracing::warn;

use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Raw attributes various decoders use to report a driver badge.
const BADGE_KEYS: [&str; 3] = ["rfid", "card", "ibutton"];

/// Normalizes driver identification: whatever raw attribute the decoder
/// used for the badge id becomes `driverUniqueId`, and a matching
/// registered driver contributes a display name.
pub struct DriverHandler<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> DriverHandler<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for DriverHandler<S> {
    fn name(&self) -> &'static str {
        "driver"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        if !position.has_attribute(keys::DRIVER_UNIQUE_ID) {
            let badge = BADGE_KEYS
                .iter()
                .find_map(|key| position.string(key).map(str::to_owned));
            if let Some(badge) = badge {
                position.set(keys::DRIVER_UNIQUE_ID, badge);
            }
        }

        let Some(unique_id) = position.string(keys::DRIVER_UNIQUE_ID).map(str::to_owned) else {
            return Ok(Outcome::Continue);
        };

        match self.storage.get_driver_by_unique_id(&unique_id).await {
            Ok(Some(driver)) => position.set("driverName", driver.name),
            Ok(None) => {}
            Err(error) => warn!(
                device_id = ?position.device_id,
                error = %error,
                "Driver lookup failed"
            ),
        }

        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::{DeviceId, Driver, DriverId};

    use crate::storage::memory::MemoryStorage;

    #[tokio::test]
    async fn badge_attribute_becomes_driver_unique_id() {
        let storage = Arc::new(MemoryStorage::default());
        storage
            .add_driver(&Driver {
                id: DriverId(0),
                name: "Maria".to_owned(),
                unique_id: "AB12".to_owned(),
                attributes: Default::default(),
            })
            .await
            .unwrap();

        let handler = DriverHandler::new(storage);
        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.set("rfid", "AB12");

        handler.handle(&mut position).await.unwrap();

        assert_eq!(position.string(keys::DRIVER_UNIQUE_ID), Some("AB12"));
        assert_eq!(position.string("driverName"), Some("Maria"));
    }
}
