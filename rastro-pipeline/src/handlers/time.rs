use async_trait::async_trait;
use jiff::SignedDuration;
use rastro_core::Position;
use tracing::debug;

use crate::config::{TimeConfig, TimeMode};
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};

/// One GPS week-number era: 1024 weeks.
const GPS_ERA: SignedDuration = SignedDuration::from_secs(1024 * 7 * 24 * 3600);

/// Corrects device clocks.
///
/// Receivers that never learned the current GPS week era report times
/// exactly 1024 weeks in the past; those are shifted forward
/// unconditionally. Beyond that, `adjust` mode substitutes server time
/// when the residual skew exceeds the configured maximum, and `server`
/// mode substitutes it always.
pub struct TimeHandler {
    config: TimeConfig,
}

impl TimeHandler {
    pub fn new(config: TimeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PositionHandler for TimeHandler {
    fn name(&self) -> &'static str {
        "time"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let mut rollovers = 0;
        while position.server_time.duration_since(position.fix_time) >= GPS_ERA && rollovers < 3 {
            position.fix_time += GPS_ERA;
            position.device_time += GPS_ERA;
            rollovers += 1;
        }
        if rollovers > 0 {
            debug!(
                device_id = ?position.device_id,
                rollovers,
                "Corrected GPS week rollover"
            );
        }

        let substitute = match self.config.mode {
            TimeMode::Off => false,
            TimeMode::Server => true,
            TimeMode::Adjust => {
                let skew = position.server_time.duration_since(position.fix_time);
                skew.abs() > self.config.max_skew()
            }
        };

        if substitute {
            position.fix_time = position.server_time;
            position.device_time = position.server_time;
        }

        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::DeviceId;

    fn handler(mode: TimeMode) -> TimeHandler {
        TimeHandler::new(TimeConfig {
            mode,
            max_skew_secs: 600,
            max_age_secs: 0,
        })
    }

    #[tokio::test]
    async fn week_rollover_is_corrected() {
        let server_time = jiff::Timestamp::from_second(1_700_000_000).unwrap();
        let mut position = Position::new(DeviceId(1), server_time);
        position.fix_time = server_time - GPS_ERA;
        position.device_time = position.fix_time;
        position.server_time = server_time;

        handler(TimeMode::Off).handle(&mut position).await.unwrap();

        assert_eq!(position.fix_time, server_time);
    }

    #[tokio::test]
    async fn adjust_mode_substitutes_on_large_skew() {
        let server_time = jiff::Timestamp::from_second(1_700_000_000).unwrap();
        let mut position = Position::new(DeviceId(1), server_time);
        position.fix_time = server_time - SignedDuration::from_secs(3600);
        position.device_time = position.fix_time;

        handler(TimeMode::Adjust)
            .handle(&mut position)
            .await
            .unwrap();

        assert_eq!(position.fix_time, server_time);
    }

    #[tokio::test]
    async fn adjust_mode_keeps_small_skew() {
        let server_time = jiff::Timestamp::from_second(1_700_000_000).unwrap();
        let fix_time = server_time - SignedDuration::from_secs(30);
        let mut position = Position::new(DeviceId(1), server_time);
        position.fix_time = fix_time;

        handler(TimeMode::Adjust)
            .handle(&mut position)
            .await
            .unwrap();

        assert_eq!(position.fix_time, fix_time);
    }
}
