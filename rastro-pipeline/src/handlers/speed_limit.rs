use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;
use rastro_core::position::keys;
use tracing::warn;

use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::providers::SpeedLimitProvider;

/// Attaches the posted speed limit for the current road segment, used
/// by the overspeed detector downstream.
pub struct SpeedLimitHandler {
    provider: Option<Arc<dyn SpeedLimitProvider>>,
}

impl SpeedLimitHandler {
    pub fn new(provider: Option<Arc<dyn SpeedLimitProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl PositionHandler for SpeedLimitHandler {
    fn name(&self) -> &'static str {
        "speed-limit"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let Some(provider) = &self.provider else {
            return Ok(Outcome::Continue);
        };

        match provider
            .speed_limit(position.latitude, position.longitude)
            .await
        {
            Ok(limit) => position.set(keys::SPEED_LIMIT, limit),
            Err(error) => warn!(
                device_id = ?position.device_id,
                error = %error,
                "Speed limit lookup failed"
            ),
        }

        Ok(Outcome::Continue)
    }
}
