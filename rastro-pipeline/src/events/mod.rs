pub mod alarm;
pub mod command_result;
pub mod driver;
pub mod fuel;
pub mod geofence;
pub mod ignition;
pub mod maintenance;
pub mod media;
pub mod motion;
pub mod overspeed;

use async_trait::async_trait;
use rastro_core::{Event, Position};

use crate::error::HandlerError;

/// One event detector, run against every position that survived the
/// position chain unfiltered.
///
/// Detectors are independent: they do not see each other's output and
/// their relative order carries no meaning. Detectors that compare
/// against the last known position must ignore fixes older than it;
/// out-of-order delivery must never flip detector state backwards.
#[async_trait]
pub trait EventDetector: Send + Sync {
    /// Detector name for logs.
    fn name(&self) -> &'static str;

    async fn analyze(&self, position: &Position) -> Result<Vec<Event>, HandlerError>;
}

/// Shared out-of-order guard: true when `position` is not older than the
/// cached reference.
pub(crate) fn is_latest(position: &Position, last: Option<&Position>) -> bool {
    last.is_none_or(|last| position.fix_time >= last.fix_time)
}
