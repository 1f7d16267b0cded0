use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rastro_core::position::keys;
use rastro_core::{Device, DeviceId, Position, geo};
use rastro_pipeline::Storage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{IngestItem, IngestSource};

/// Ticks per phase of the drive/park cycle.
const MOVING_TICKS: u32 = 90;
const PARKED_TICKS: u32 = 90;

/// Cruise speed while in the moving phase, knots.
const CRUISE_SPEED: f64 = 30.0;

/// Generates fixes for simulated devices that alternate driving and
/// parking, enough to exercise filtering, trip detection and geofences
/// without real trackers.
pub struct MockIngestSource<S: Storage> {
    storage: Arc<S>,
    device_count: usize,
    interval: Duration,
}

impl<S: Storage> MockIngestSource<S> {
    pub fn new(storage: Arc<S>, device_count: usize, interval_secs: u64) -> Self {
        Self {
            storage,
            device_count,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }
}

struct MockDevice {
    device_id: DeviceId,
    latitude: f64,
    longitude: f64,
    course: f64,
    /// Ticks remaining in the current phase.
    remaining: u32,
    moving: bool,
}

impl MockDevice {
    fn advance(&mut self, interval: Duration) -> (f64, bool) {
        if self.remaining == 0 {
            self.moving = !self.moving;
            self.remaining = if self.moving {
                MOVING_TICKS
            } else {
                PARKED_TICKS
            };
            if self.moving {
                // Head somewhere new each trip.
                self.course = rand::rng().random_range(0.0..360.0);
            }
        }
        self.remaining -= 1;

        if !self.moving {
            return (0.0, false);
        }

        let speed = {
            let mut rng = rand::rng();
            CRUISE_SPEED + rng.random_range(-5.0..5.0)
        };
        let meters = speed * 0.514444 * interval.as_secs_f64();
        let heading = self.course.to_radians();
        self.latitude += meters * heading.cos() / 111_320.0;
        self.longitude += geo::longitude_delta(meters * heading.sin(), self.latitude);
        (speed, true)
    }
}

#[async_trait]
impl<S: Storage> IngestSource for MockIngestSource<S> {
    type Error = S::Error;

    async fn start(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<IngestItem>, Self::Error> {
        let (tx, rx) = mpsc::channel(100);

        let mut devices = Vec::with_capacity(self.device_count);
        for index in 0..self.device_count {
            let unique_id = format!("mock-{index}");
            let device_id = match self.storage.get_device_by_unique_id(&unique_id).await? {
                Some(device) => device.id,
                None => {
                    let mut device = Device::new(DeviceId(0), &unique_id);
                    device.name = format!("Mock tracker {index}");
                    self.storage.add_device(&device).await?
                }
            };
            let (latitude, longitude) = {
                let mut rng = rand::rng();
                (
                    52.5 + rng.random_range(-0.05..0.05),
                    13.4 + rng.random_range(-0.05..0.05),
                )
            };
            devices.push(MockDevice {
                device_id,
                latitude,
                longitude,
                course: 0.0,
                remaining: PARKED_TICKS,
                moving: false,
            });
        }

        info!(device_count = devices.len(), "Mock ingest started");

        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Mock ingest shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        for device in &mut devices {
                            let (speed, ignition) = device.advance(interval);
                            let now = jiff::Timestamp::now();
                            let mut position = Position::new(device.device_id, now);
                            position.protocol = "mock".to_owned();
                            position.latitude = device.latitude;
                            position.longitude = device.longitude;
                            position.speed = speed;
                            position.course = device.course;
                            position.set(keys::IGNITION, ignition);

                            if tx.send(IngestItem { position, ack: None }).await.is_err() {
                                warn!("Ingest channel closed");
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
