use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::error::HandlerError;
use crate::events::EventDetector;

/// Surfaces command responses the device piggybacks on a position.
pub struct CommandResultDetector;

#[async_trait]
impl EventDetector for CommandResultDetector {
    fn name(&self) -> &'static str {
        "command-result"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let Some(result) = position.string(keys::COMMAND_RESULT) else {
            return Ok(Vec::new());
        };

        let mut event = Event::new(
            event::TYPE_COMMAND_RESULT,
            position.device_id,
            position.id,
            position.fix_time,
        );
        event.set(keys::COMMAND_RESULT, result);
        Ok(vec![event])
    }
}
