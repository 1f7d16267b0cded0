use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rastro_core::{Device, DeviceId, Network, Position, Value};
use rastro_pipeline::Storage;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, tcp::OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Span, error, field, info, instrument, warn};

use super::{IngestItem, IngestSource};

#[derive(Debug, thiserror::Error)]
pub enum TcpIngestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded fix as devices put it on the wire: a line of JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFix {
    unique_id: String,
    #[serde(default)]
    protocol: Option<String>,
    #[serde(default)]
    fix_time: Option<jiff::Timestamp>,
    #[serde(default)]
    device_time: Option<jiff::Timestamp>,
    #[serde(default = "default_valid")]
    valid: bool,
    #[serde(default)]
    latitude: f64,
    #[serde(default)]
    longitude: f64,
    #[serde(default)]
    altitude: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    course: f64,
    #[serde(default)]
    accuracy: f64,
    #[serde(default)]
    attributes: BTreeMap<String, Value>,
    #[serde(default)]
    network: Option<Network>,
    #[serde(default)]
    outdated: bool,
}

fn default_valid() -> bool {
    true
}

impl WireFix {
    fn into_position(self, device_id: DeviceId, now: jiff::Timestamp) -> Position {
        let mut position = Position::new(device_id, now);
        position.protocol = self.protocol.unwrap_or_else(|| "json".to_owned());
        position.server_time = now;
        position.device_time = self.device_time.or(self.fix_time).unwrap_or(now);
        position.fix_time = self.fix_time.unwrap_or(now);
        position.valid = self.valid;
        position.latitude = self.latitude;
        position.longitude = self.longitude;
        position.altitude = self.altitude;
        position.speed = self.speed;
        position.course = self.course;
        position.accuracy = self.accuracy;
        position.attributes = self.attributes;
        position.network = self.network;
        position.outdated = self.outdated;
        position
    }
}

/// Newline-delimited JSON ingest: one tracker per connection, one fix
/// per line, one acknowledgement line written back per fix after its
/// chain completes.
pub struct TcpIngestSource<S: Storage> {
    addr: SocketAddr,
    storage: Arc<S>,
    register_unknown: bool,
}

impl<S: Storage> TcpIngestSource<S> {
    pub fn new(addr: SocketAddr, storage: Arc<S>, register_unknown: bool) -> Self {
        Self {
            addr,
            storage,
            register_unknown,
        }
    }
}

#[async_trait]
impl<S: Storage> IngestSource for TcpIngestSource<S> {
    type Error = TcpIngestError;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<IngestItem>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %self.addr, "TCP ingest listening");

        tokio::spawn(run_server_loop(
            listener,
            tx,
            cancel,
            self.storage.clone(),
            self.register_unknown,
        ));

        Ok(rx)
    }
}

async fn run_server_loop<S: Storage>(
    listener: TcpListener,
    tx: mpsc::Sender<IngestItem>,
    cancel: CancellationToken,
    storage: Arc<S>,
    register_unknown: bool,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing TCP ingest");
                break;
            }
            client = listener.accept() => {
                match client {
                    Ok((stream, addr)) => {
                        info!(%addr, "Tracker connected");
                        let tx = tx.clone();
                        let cancel = cancel.clone();
                        let storage = storage.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(
                                stream, tx, cancel, storage, register_unknown,
                            )
                            .await
                            {
                                error!(error = %e, "Connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        if is_transient_error(&e) {
                            sleep(Duration::from_millis(100)).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | OutOfMemory | Other
    )
}

#[instrument(name = "tracker", skip_all, fields(device_id = field::Empty))]
async fn handle_connection<S: Storage>(
    stream: TcpStream,
    tx: mpsc::Sender<IngestItem>,
    cancel: CancellationToken,
    storage: Arc<S>,
    register_unknown: bool,
) -> std::io::Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    // Acknowledgements come back asynchronously from post-processing;
    // a dedicated writer keeps them off the read path.
    let (ack_tx, ack_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_acks(write_half, ack_rx));

    // One device per connection, typically; remember the resolution.
    let mut device_id: Option<DeviceId> = None;

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            info!("Tracker closed connection");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let fix: WireFix = match serde_json::from_str(&line) {
            Ok(fix) => fix,
            Err(e) => {
                warn!(error = %e, "Discarding malformed fix");
                continue;
            }
        };

        let id = match device_id {
            Some(id) => id,
            None => {
                match resolve_device(&storage, &fix.unique_id, register_unknown).await {
                    Some(id) => {
                        Span::current().record("device_id", field::debug(id));
                        device_id = Some(id);
                        id
                    }
                    None => {
                        warn!(unique_id = %fix.unique_id, "Fix from unknown device discarded");
                        continue;
                    }
                }
            }
        };

        let position = fix.into_position(id, jiff::Timestamp::now());
        if tx
            .send(IngestItem {
                position,
                ack: Some(ack_tx.clone()),
            })
            .await
            .is_err()
        {
            error!("Ingest channel closed");
            break;
        }
    }

    drop(ack_tx);
    let _ = writer.await;
    Ok(())
}

async fn resolve_device<S: Storage>(
    storage: &Arc<S>,
    unique_id: &str,
    register_unknown: bool,
) -> Option<DeviceId> {
    match storage.get_device_by_unique_id(unique_id).await {
        Ok(Some(device)) => Some(device.id),
        Ok(None) if register_unknown => {
            let device = Device::new(DeviceId(0), unique_id);
            match storage.add_device(&device).await {
                Ok(id) => {
                    info!(unique_id = %unique_id, device_id = ?id, "Registered new device");
                    Some(id)
                }
                Err(e) => {
                    warn!(unique_id = %unique_id, error = %e, "Failed to register device");
                    None
                }
            }
        }
        Ok(None) => None,
        Err(e) => {
            warn!(unique_id = %unique_id, error = %e, "Device lookup failed");
            None
        }
    }
}

async fn write_acks(
    mut writer: OwnedWriteHalf,
    mut ack_rx: mpsc::UnboundedReceiver<rastro_pipeline::Ack>,
) {
    while let Some(ack) = ack_rx.recv().await {
        let line = serde_json::json!({
            "fixTime": ack.fix_time,
            "filtered": ack.filtered,
            "positionId": ack.position_id.0,
        });
        let mut bytes = line.to_string().into_bytes();
        bytes.push(b'\n');
        if let Err(e) = writer.write_all(&bytes).await {
            warn!(error = %e, "Failed to write acknowledgement");
            break;
        }
    }
}
