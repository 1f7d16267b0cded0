pub mod mock;
pub mod tcp;

use async_trait::async_trait;
use rastro_core::Position;
use rastro_pipeline::AckSender;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One decoded fix on its way into the sequencer, with the channel its
/// acknowledgement should go back on. Sources without a transport to
/// acknowledge to leave it unset.
pub struct IngestItem {
    pub position: Position,
    pub ack: Option<AckSender>,
}

/// A source of decoded positions.
///
/// Implementations spawn background tasks that decode fixes and send
/// them into the returned channel until the cancellation token fires.
#[async_trait]
pub trait IngestSource: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<IngestItem>, Self::Error>;
}
