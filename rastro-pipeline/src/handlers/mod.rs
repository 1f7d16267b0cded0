pub mod computed;
pub mod copy_attributes;
pub mod distance;
pub mod driver;
pub mod engine_hours;
pub mod filter;
pub mod forwarding;
pub mod geocode;
pub mod geofence;
pub mod geolocation;
pub mod hemisphere;
pub mod motion;
pub mod outdated;
pub mod persistence;
pub mod speed_limit;
pub mod time;

use async_trait::async_trait;
use rastro_core::Position;

use crate::error::HandlerError;

/// What a stage decided about the position it was handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pass the position to the next stage.
    Continue,
    /// Stop the chain: the position is not persisted and produces no
    /// events. Post-processing still runs and the fix is still
    /// acknowledged.
    Filtered,
}

/// One stage of the position chain.
///
/// A stage returns exactly once per position, after any I/O it needs has
/// resolved; the driver never hands a position to the next stage before
/// the previous stage returned. Recoverable lookup failures are handled
/// inside the stage (logged, position passed on unenriched); an `Err`
/// makes the driver treat the chain as filtered from this stage on.
#[async_trait]
pub trait PositionHandler: Send + Sync {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError>;
}
