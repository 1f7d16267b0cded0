use async_trait::async_trait;
use rastro_core::Position;
use tracing::info;

use crate::config::TimeConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};

/// Rejects positions whose fix time is implausibly old relative to the
/// server clock. Not an error: old queued fixes from a device that was
/// offline for months are expected and simply dropped.
pub struct OutdatedHandler {
    config: TimeConfig,
}

impl OutdatedHandler {
    pub fn new(config: TimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PositionHandler for OutdatedHandler {
    fn name(&self) -> &'static str {
        "outdated"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        if self.config.max_age_secs == 0 {
            return Ok(Outcome::Continue);
        }

        let age = position.server_time.duration_since(position.fix_time);
        if age > self.config.max_age() {
            info!(
                device_id = ?position.device_id,
                fix_time = %position.fix_time,
                "Dropping outdated position"
            );
            return Ok(Outcome::Filtered);
        }

        Ok(Outcome::Continue)
    }
}
