use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, GeofenceId, Position, event};

use crate::cache::{DeviceCache, DeviceRuntimeState};
use crate::config::OverspeedConfig;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::storage::Storage;

/// Device/group attribute carrying the default speed limit, knots.
const SPEED_LIMIT_KEY: &str = "speedLimit";

/// Detects sustained overspeeding.
///
/// The limit is resolved in order of precedence: a limit from a
/// containing geofence, then the road-segment limit attached by the
/// speed-limit stage, then the device/group attribute. A single fast
/// sample never fires: the speed must stay above the limit for the
/// configured minimum duration, and the event is anchored at the first
/// position of the streak.
pub struct OverspeedDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    config: OverspeedConfig,
}

impl<S: Storage> OverspeedDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, config: OverspeedConfig) -> Self {
        Self { cache, config }
    }

    /// The strictest (or loosest, per config) limit among containing
    /// geofences that define one.
    fn geofence_limit(&self, position: &Position) -> (f64, GeofenceId) {
        let mut limit = 0.0;
        let mut geofence_id = GeofenceId(0);
        for geofence in self.cache.geofences(position.device_id) {
            if !position.geofence_ids.contains(&geofence.id) {
                continue;
            }
            let Some(candidate) = geofence
                .attributes
                .get(SPEED_LIMIT_KEY)
                .and_then(|value| value.as_f64())
                .filter(|candidate| *candidate > 0.0)
            else {
                continue;
            };
            let better = limit == 0.0
                || (self.config.prefer_lowest && candidate < limit)
                || (!self.config.prefer_lowest && candidate > limit);
            if better {
                limit = candidate;
                geofence_id = geofence.id;
            }
        }
        (limit, geofence_id)
    }

    fn new_event(
        &self,
        state: &mut DeviceRuntimeState,
        limit: f64,
    ) -> Option<Event> {
        let start = state.overspeed_position.take()?;
        let mut event = Event::new(
            event::TYPE_DEVICE_OVERSPEED,
            start.device_id,
            start.id,
            start.fix_time,
        );
        event.set(keys::SPEED, start.speed);
        event.set(keys::SPEED_LIMIT, limit);
        event.geofence_id = state.overspeed_geofence_id;

        // With not_repeat, staying armed suppresses further events
        // until the speed drops below the limit again.
        state.overspeed_state = Some(self.config.not_repeat);
        state.overspeed_geofence_id = GeofenceId(0);
        Some(event)
    }

    fn update(
        &self,
        state: &mut DeviceRuntimeState,
        position: &Position,
        limit: f64,
        geofence_id: GeofenceId,
    ) -> Option<Event> {
        let old_overspeed = state.overspeed_state.unwrap_or(false);
        let new_overspeed = position.speed > limit;

        if new_overspeed && !old_overspeed {
            if state.overspeed_position.is_none() {
                state.overspeed_position = Some(position.clone());
                state.overspeed_geofence_id = geofence_id;
            }
        } else if old_overspeed && !new_overspeed {
            state.overspeed_state = Some(false);
            state.overspeed_position = None;
            state.overspeed_geofence_id = GeofenceId(0);
        } else {
            state.overspeed_position = None;
            state.overspeed_geofence_id = GeofenceId(0);
        }

        let streak_start = state.overspeed_position.as_ref()?.fix_time;
        if new_overspeed && streak_start + self.config.min_duration() <= position.fix_time {
            self.new_event(state, limit)
        } else {
            None
        }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for OverspeedDetector<S> {
    fn name(&self) -> &'static str {
        "overspeed"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) || !position.valid {
            return Ok(Vec::new());
        }

        let mut limit = self
            .cache
            .lookup_double(position.device_id, SPEED_LIMIT_KEY)
            .unwrap_or(0.0);

        if let Some(posted) = position.double(keys::SPEED_LIMIT).filter(|limit| *limit > 0.0) {
            limit = posted;
        }

        let (geofence_limit, geofence_id) = self.geofence_limit(position);
        if geofence_limit > 0.0 {
            limit = geofence_limit;
        }

        if limit == 0.0 {
            return Ok(Vec::new());
        }

        let event = self.cache.with_runtime(position.device_id, |state| {
            if state.overspeed_state.is_none() {
                let overspeed = position.speed > limit;
                state.overspeed_state = Some(overspeed);
                state.overspeed_geofence_id = if overspeed {
                    geofence_id
                } else {
                    GeofenceId(0)
                };
                None
            } else {
                self.update(state, position, limit, geofence_id)
            }
        });

        Ok(event.into_iter().collect())
    }
}
