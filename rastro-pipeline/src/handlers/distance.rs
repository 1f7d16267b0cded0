use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Position, geo};

use crate::cache::DeviceCache;
use crate::config::CoordinatesConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Computes the per-step distance and the running total.
///
/// A decoder-supplied distance is trusted as-is. With jump filtering
/// enabled, fixes that moved less than `min_error` from a valid last
/// position snap back to it (GPS jitter while parked), and invalid
/// fixes that jumped more than `max_error` snap back likewise.
pub struct DistanceHandler<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    config: CoordinatesConfig,
}

impl<S: Storage> DistanceHandler<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, config: CoordinatesConfig) -> Self {
        Self { cache, config }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for DistanceHandler<S> {
    fn name(&self) -> &'static str {
        "distance"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let last = self.cache.last_position(position.device_id);

        let mut distance = match position.double(keys::DISTANCE) {
            Some(reported) => reported,
            None => match &last {
                Some(last) => geo::distance(
                    position.latitude,
                    position.longitude,
                    last.latitude,
                    last.longitude,
                ),
                None => 0.0,
            },
        };

        if self.config.filter
            && let Some(last) = &last
            && last.valid
            && (last.latitude != 0.0 || last.longitude != 0.0)
        {
            let jitter = self.config.min_error > 0.0 && distance < self.config.min_error;
            let jump = self.config.max_error > 0.0
                && distance > self.config.max_error
                && !position.valid;
            if jitter || jump {
                position.latitude = last.latitude;
                position.longitude = last.longitude;
                distance = 0.0;
            }
        }

        let last_total = last
            .as_ref()
            .and_then(|last| last.double(keys::TOTAL_DISTANCE))
            .unwrap_or(0.0);

        let odometer = position.double(keys::ODOMETER).unwrap_or(0.0);
        let total = if self.config.use_odometer && odometer > 0.0 {
            odometer
        } else {
            geo::round_centi(last_total + distance)
        };

        position.set(keys::DISTANCE, geo::round_centi(distance));
        position.set(keys::TOTAL_DISTANCE, total);

        Ok(Outcome::Continue)
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

    fn position(latitude: f64, longitude: f64) -> Position {
        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.latitude = latitude;
        position.longitude = longitude;
        position
    }

    #[tokio::test]
    async fn first_position_has_zero_distance() {
        let handler = DistanceHandler::new(cache(), CoordinatesConfig::default());
        let mut p = position(10.0, 20.0);

        handler.handle(&mut p).await.unwrap();

        assert_eq!(p.double(keys::DISTANCE), Some(0.0));
        assert_eq!(p.double(keys::TOTAL_DISTANCE), Some(0.0));
    }

    #[tokio::test]
    async fn distance_accumulates_from_last_position() {
        let cache = cache();
        let handler = DistanceHandler::new(cache.clone(), CoordinatesConfig::default());

        let mut first = position(0.0, 0.0);
        handler.handle(&mut first).await.unwrap();
        cache.set_last_position(first);

        let delta = geo::longitude_delta(600.0, 0.0);
        let mut second = position(0.0, delta);
        handler.handle(&mut second).await.unwrap();

        let step = second.double(keys::DISTANCE).unwrap();
        assert!((step - 600.0).abs() < 1.0, "step {step}");
        assert_eq!(second.double(keys::TOTAL_DISTANCE), Some(step));
    }

    #[tokio::test]
    async fn jitter_snaps_back_to_last_coordinates() {
        let cache = cache();
        let config = CoordinatesConfig {
            filter: true,
            min_error: 10.0,
            max_error: 0.0,
            use_odometer: false,
        };
        let handler = DistanceHandler::new(cache.clone(), config);

        let mut first = position(10.0, 20.0);
        handler.handle(&mut first).await.unwrap();
        cache.set_last_position(first.clone());

        // A meter or so of drift.
        let mut second = position(10.000005, 20.0);
        handler.handle(&mut second).await.unwrap();

        assert_eq!(second.latitude, first.latitude);
        assert_eq!(second.longitude, first.longitude);
        assert_eq!(second.double(keys::DISTANCE), Some(0.0));
    }

    #[tokio::test]
    async fn invalid_jump_snaps_back() {
        let cache = cache();
        let config = CoordinatesConfig {
            filter: true,
            min_error: 10.0,
            max_error: 1000.0,
            use_odometer: false,
        };
        let handler = DistanceHandler::new(cache.clone(), config);

        let mut first = position(10.0, 20.0);
        handler.handle(&mut first).await.unwrap();
        cache.set_last_position(first.clone());

        let mut second = position(11.0, 20.0);
        second.valid = false;
        handler.handle(&mut second).await.unwrap();

        assert_eq!(second.latitude, first.latitude);
        assert_eq!(second.double(keys::DISTANCE), Some(0.0));
    }

    #[tokio::test]
    async fn odometer_overrides_running_total() {
        let cache = cache();
        let config = CoordinatesConfig {
            use_odometer: true,
            ..CoordinatesConfig::default()
        };
        let handler = DistanceHandler::new(cache, config);

        let mut p = position(0.0, 0.0);
        p.set(keys::ODOMETER, 123_456.0);
        handler.handle(&mut p).await.unwrap();

        assert_eq!(p.double(keys::TOTAL_DISTANCE), Some(123_456.0));
    }
}
