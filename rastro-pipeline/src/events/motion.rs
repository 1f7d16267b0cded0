use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position};
use tracing::warn;

use crate::cache::DeviceCache;
use crate::config::MotionConfig;
use crate::error::HandlerError;
use crate::events::{EventDetector, is_latest};
use crate::motion;
use crate::storage::Storage;

/// Drives the trip/parking state machine and persists its columns.
///
/// The moving signal is the motion attribute computed earlier in the
/// chain, or the ignition attribute in ignition mode. Back-dated fixes
/// never reach the state machine. Columns are written back, as a
/// partial column update, only when a transition changed them.
pub struct MotionEventDetector<S: Storage> {
    cache: Arc<DeviceCache<S>>,
    storage: Arc<S>,
    config: MotionConfig,
}

impl<S: Storage> MotionEventDetector<S> {
    pub fn new(cache: Arc<DeviceCache<S>>, storage: Arc<S>, config: MotionConfig) -> Self {
        Self {
            cache,
            storage,
            config,
        }
    }
}

#[async_trait]
impl<S: Storage> EventDetector for MotionEventDetector<S> {
    fn name(&self) -> &'static str {
        "motion"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let last = self.cache.last_position(position.device_id);
        if !is_latest(position, last.as_ref()) {
            return Ok(Vec::new());
        }

        let Some(device) = self.cache.device(position.device_id) else {
            return Ok(Vec::new());
        };

        let moving = if self.config.use_ignition && position.has_attribute(keys::IGNITION) {
            position.boolean(keys::IGNITION).unwrap_or(false)
        } else {
            position.boolean(keys::MOTION).unwrap_or(false)
        };

        let mut columns = device.motion;
        let outcome = motion::update_state(
            &mut columns,
            last.as_ref(),
            position,
            moving,
            &self.config,
        );

        if outcome.changed {
            self.cache.update_motion(position.device_id, &columns);
            if let Err(error) = self
                .storage
                .update_motion_state(position.device_id, &columns)
                .await
            {
                warn!(
                    device_id = ?position.device_id,
                    error = %error,
                    "Failed to persist motion state"
                );
            }
        }

        Ok(outcome.event.into_iter().collect())
    }
}
