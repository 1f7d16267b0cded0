use async_trait::async_trait;
use rastro_core::position::keys;
use rastro_core::{Event, Position, event};

use crate::error::HandlerError;
use crate::events::EventDetector;

/// Positions carrying an attached media file produce a media event so
/// consumers can fetch the file.
pub struct MediaDetector;

#[async_trait]
impl EventDetector for MediaDetector {
    fn name(&self) -> &'static str {
        "media"
    }

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError> {
        let Some(media) = position.string(keys::MEDIA) else {
            return Ok(Vec::new());
        };

        let mut event = Event::new(
            event::TYPE_MEDIA,
            position.device_id,
            position.id,
            position.fix_time,
        );
        event.set(keys::MEDIA, media);
        Ok(vec![event])
    }
}
