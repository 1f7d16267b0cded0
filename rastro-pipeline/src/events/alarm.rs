use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::error::HandlerError;
use crate::events::EventDetector;

/// Passthrough: any position carrying an alarm attribute produces an
/// alarm event of that sub-type.
pub struct AlarmDetector;

#[async_trait]
impl EventDetector for AlarmDetector {
    fn name(&self) -> &'static str {
        "alarm"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let Some(alarm) = position.string(keys::ALARM) else {
            return Ok(Vec::new());
        };

        let mut event = Event::new(
            event::TYPE_ALARM,
            position.device_id,
            position.id,
            position.fix_time,
        );
        event.set(keys::ALARM, alarm);
        Ok(vec![event])
    }
}
