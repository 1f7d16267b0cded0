use async_trait::async_trait;
use rastro_core::Position;

use crate::config::HemisphereConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};

/// Forces coordinate signs for decoders that report magnitudes only.
/// A device installed in the southern or western hemisphere can be
/// configured with "S"/"W" to flip the raw encoding.
pub struct HemisphereHandler {
    latitude_negative: Option<bool>,
    longitude_negative: Option<bool>,
}

impl HemisphereHandler {
    pub fn new(config: &HemisphereConfig) -> Self {
        Self {
            latitude_negative: config
                .latitude
                .as_deref()
                .map(|value| value.eq_ignore_ascii_case("s")),
            longitude_negative: config
                .longitude
                .as_deref()
                .map(|value| value.eq_ignore_ascii_case("w")),
        }
    }
}

#[async_trait]
impl PositionHandler for HemisphereHandler {
    fn name(&self) -> &'static str {
        "hemisphere"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        if let Some(negative) = self.latitude_negative {
            let magnitude = position.latitude.abs();
            position.latitude = if negative { -magnitude } else { magnitude };
        }
        if let Some(negative) = self.longitude_negative {
            let magnitude = position.longitude.abs();
            position.longitude = if negative { -magnitude } else { magnitude };
        }
        Ok(Outcome::Continue)
    }
}
