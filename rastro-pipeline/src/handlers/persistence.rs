use std::sync::Arc;

use async_trait::async_trait;
use rastro_core::Position;
use tracing::warn;

use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};
use crate::storage::Storage;

/// Writes the position row and assigns its id.
///
/// A failed write is logged and the chain continues: the device still
/// gets its acknowledgement, and event detection still runs against the
/// in-memory position.
pub struct PersistenceHandler<S: Storage> {
    storage: Arc<S>,
}

impl<S: Storage> PersistenceHandler<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: Storage> PositionHandler for PersistenceHandler<S> {
    fn name(&self) -> &'static str {
        "persistence"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        match self.storage.add_position(position).await {
            Ok(id) => position.id = id,
            Err(error) => warn!(
                device_id = ?position.device_id,
                error = %error,
                "Failed to store position"
            ),
        }
        Ok(Outcome::Continue)
    }
}
