use std::sync::Arc;

use async_trait::async_trait;
use jiff::SignedDuration;
use rastro_core::position::keys;
use rastro_core::{Position, units};
use tracing::info;

use crate::cache::DeviceCache;
use crate::config::FilterConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Per-device attribute naming extra attributes that exempt a fix from
/// the duplicate/stationary/distance filters.
const SKIP_ATTRIBUTES_KEY: &str = "filter.skipAttributes";

/// Drops positions matching the configured filter rules. A dropped
/// position is still acknowledged to the device; it just never reaches
/// persistence or event detection.
pub struct FilterHandler<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    config: FilterConfig,
}

impl<S: Storage> FilterHandler<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, config: FilterConfig) -> Self {
        Self { cache, config }
    }

    fn filter_invalid(&self, position: &Position) -> bool {
        self.config.invalid
            && (!position.valid
                || position.latitude > 90.0
                || position.latitude < -90.0
                || position.longitude > 180.0
                || position.longitude < -180.0)
    }

    fn filter_zero(&self, position: &Position) -> bool {
        self.config.zero && position.latitude == 0.0 && position.longitude == 0.0
    }

    fn filter_duplicate(&self, position: &Position, last: Option<&Position>) -> bool {
        let Some(last) = last else {
            return false;
        };
        if !self.config.duplicate || position.fix_time != last.fix_time {
            return false;
        }
        // A retransmission that carries new attributes is not a
        // duplicate.
        position
            .attributes
            .keys()
            .all(|key| last.attributes.contains_key(key))
    }

    fn filter_future(&self, position: &Position) -> bool {
        self.config.future_secs != 0
            && position.fix_time > position.server_time + self.config.future()
    }

    fn filter_accuracy(&self, position: &Position) -> bool {
        self.config.accuracy != 0.0 && position.accuracy > self.config.accuracy
    }

    fn filter_approximate(&self, position: &Position) -> bool {
        self.config.approximate && position.boolean(keys::APPROXIMATE) == Some(true)
    }

    fn filter_static(&self, position: &Position) -> bool {
        self.config.stationary && position.speed == 0.0
    }

    fn filter_distance(&self, position: &Position, last: Option<&Position>) -> bool {
        self.config.min_distance != 0.0
            && last.is_some()
            && position.double(keys::DISTANCE).unwrap_or(0.0) < self.config.min_distance
    }

    fn filter_max_speed(&self, position: &Position, last: Option<&Position>) -> bool {
        let Some(last) = last else {
            return false;
        };
        if self.config.max_speed == 0.0 {
            return false;
        }
        let distance = position.double(keys::DISTANCE).unwrap_or(0.0);
        let elapsed = position.fix_time.duration_since(last.fix_time);
        if elapsed <= SignedDuration::ZERO {
            return false;
        }
        units::knots_from_mps(distance / elapsed.as_secs_f64()) > self.config.max_speed
    }

    fn filter_min_period(&self, position: &Position, last: Option<&Position>) -> bool {
        let Some(last) = last else {
            return false;
        };
        if self.config.min_period_secs == 0 {
            return false;
        }
        let elapsed = position.fix_time.duration_since(last.fix_time);
        elapsed > SignedDuration::ZERO && elapsed < self.config.min_period()
    }

    /// Escape hatch: after a long enough silence even a filtered-class
    /// fix is kept, so a parked device still leaves a trail.
    fn skip_limit(&self, position: &Position, last: Option<&Position>) -> bool {
        let Some(last) = last else {
            return false;
        };
        self.config.skip_limit_secs != 0
            && position.server_time.duration_since(last.server_time) > self.config.skip_limit()
    }

    fn skip_attributes(&self, position: &Position) -> bool {
        if !self.config.skip_attributes {
            return false;
        }
        let Some(listed) = self
            .cache
            .lookup_string(position.device_id, SKIP_ATTRIBUTES_KEY)
        else {
            return false;
        };
        listed
            .split([' ', ','])
            .filter(|key| !key.is_empty())
            .any(|key| position.attributes.contains_key(key))
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for FilterHandler<S> {
    fn name(&self) -> &'static str {
        "filter"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        let last = last.as_ref();

        let mut reasons = Vec::new();
        let skip = self.skip_limit(position, last) || self.skip_attributes(position);

        if self.filter_invalid(position) {
            reasons.push("Invalid");
        }
        if self.filter_zero(position) {
            reasons.push("Zero");
        }
        if self.filter_duplicate(position, last) && !skip {
            reasons.push("Duplicate");
        }
        if self.filter_future(position) {
            reasons.push("Future");
        }
        if self.filter_accuracy(position) {
            reasons.push("Accuracy");
        }
        if self.filter_approximate(position) {
            reasons.push("Approximate");
        }
        if self.filter_static(position) && !skip {
            reasons.push("Static");
        }
        if self.filter_distance(position, last) && !skip {
            reasons.push("Distance");
        }
        if self.filter_max_speed(position, last) {
            reasons.push("MaxSpeed");
        }
        if self.filter_min_period(position, last) {
            reasons.push("MinPeriod");
        }

        if reasons.is_empty() {
            return Ok(Outcome::Continue);
        }

        info!(
            device_id = ?position.device_id,
            reasons = reasons.join(" "),
            "Position filtered"
        );
        Ok(Outcome::Filtered)
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

    fn handler(config: FilterConfig) -> FilterHandler<MemoryStorage> {
        FilterHandler::new(cache(), config)
    }

    fn handler_with_cache(
        cache: Arc<DeviceCache<MemoryStorage>>,
        config: FilterConfig,
    ) -> FilterHandler<MemoryStorage> {
        FilterHandler::new(cache, config)
    }

    #[tokio::test]
    async fn invalid_fix_is_filtered() {
        let handler = handler(FilterConfig {
            invalid: true,
            ..FilterConfig::default()
        });

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.valid = false;

        assert_eq!(
            handler.handle(&mut position).await.unwrap(),
            Outcome::Filtered
        );
    }

    #[tokio::test]
    async fn out_of_range_coordinates_are_invalid() {
        let handler = handler(FilterConfig {
            invalid: true,
            ..FilterConfig::default()
        });

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.latitude = 95.0;

        assert_eq!(
            handler.handle(&mut position).await.unwrap(),
            Outcome::Filtered
        );
    }

    #[tokio::test]
    async fn duplicate_fix_time_is_filtered() {
        let cache = cache();
        let handler = handler_with_cache(
            cache.clone(),
            FilterConfig {
                duplicate: true,
                ..FilterConfig::default()
            },
        );

        let first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        cache.set_last_position(first.clone());

        let mut second = first.clone();
        assert_eq!(
            handler.handle(&mut second).await.unwrap(),
            Outcome::Filtered
        );
    }

    #[tokio::test]
    async fn duplicate_with_new_attributes_is_kept() {
        let cache = cache();
        let handler = handler_with_cache(
            cache.clone(),
            FilterConfig {
                duplicate: true,
                ..FilterConfig::default()
            },
        );

        let first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        cache.set_last_position(first.clone());

        let mut second = first.clone();
        second.set(keys::ALARM, "sos");
        assert_eq!(
            handler.handle(&mut second).await.unwrap(),
            Outcome::Continue
        );
    }

    #[tokio::test]
    async fn static_fix_is_filtered() {
        let handler = handler(FilterConfig {
            stationary: true,
            ..FilterConfig::default()
        });

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.speed = 0.0;

        assert_eq!(
            handler.handle(&mut position).await.unwrap(),
            Outcome::Filtered
        );
    }

    #[tokio::test]
    async fn skip_limit_lets_stale_device_through() {
        let cache = cache();
        let handler = handler_with_cache(
            cache.clone(),
            FilterConfig {
                stationary: true,
                skip_limit_secs: 60,
                ..FilterConfig::default()
            },
        );

        let mut first = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        first.server_time = jiff::Timestamp::UNIX_EPOCH;
        cache.set_last_position(first);

        let mut second = Position::new(
            DeviceId(1),
            jiff::Timestamp::from_second(3600).unwrap(),
        );
        second.speed = 0.0;

        assert_eq!(
            handler.handle(&mut second).await.unwrap(),
            Outcome::Continue
        );
    }

    #[tokio::test]
    async fn clean_fix_passes_all_filters() {
        let handler = handler(FilterConfig {
            invalid: true,
            zero: true,
            duplicate: true,
            stationary: false,
            ..FilterConfig::default()
        });

        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.latitude = 52.5;
        position.longitude = 13.4;
        position.speed = 10.0;

        assert_eq!(
            handler.handle(&mut position).await.unwrap(),
            Outcome::Continue
        );
    }
}
