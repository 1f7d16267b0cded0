use async_trait::async_trait;
use rastro_core::Position;
use rastro_core::position::keys;

use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};

/// Derives the instantaneous moving flag from speed when the decoder
/// did not report one. Decoder-provided flags win.
pub struct MotionHandler {
    speed_threshold: f64,
}

impl MotionHandler {
    pub fn new(speed_threshold: f64) -> Self {
        Self { speed_threshold }
    }
}

#[async_trait]
impl PositionHandler for MotionHandler {
    fn name(&self) -> &'static str {
        "motion"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        if !position.has_attribute(keys::MOTION) {
            position.set(keys::MOTION, position.speed > self.speed_threshold);
        }
        Ok(Outcome::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rastro_core::DeviceId;

    #[tokio::test]
    async fn speed_derives_flag_when_absent() {
        let handler = MotionHandler::new(0.01);
        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.speed = 5.0;

        handler.handle(&mut position).await.unwrap();

        assert_eq!(position.boolean(keys::MOTION), Some(true));
    }

    #[tokio::test]
    async fn decoder_flag_wins() {
        let handler = MotionHandler::new(0.01);
        let mut position = Position::new(DeviceId(1), jiff::Timestamp::UNIX_EPOCH);
        position.speed = 5.0;
        position.set(keys::MOTION, false);

        handler.handle(&mut position).await.unwrap();

        assert_eq!(position.boolean(keys::MOTION), Some(false));
    }
}
