use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rastro_core::{DeviceId, Position, PositionId};
use tokio::sync::{Notify, mpsc};
use tracing::{info, warn};

use crate::pipeline::Pipeline;
use crate::storage::Storage;

/// Acknowledgement sent back toward the transport once a position has
/// completed post-processing, filtered or not.
#[derive(Debug, Clone)]
pub struct Ack {
    pub device_id: DeviceId,
    /// Assigned storage id, 0 when the position was filtered or the
    /// write failed.
    pub position_id: PositionId,
    pub fix_time: jiff::Timestamp,
    pub filtered: bool,
}

/// Channel a transport hands in with each position to receive its
/// acknowledgement on.
pub type AckSender = mpsc::UnboundedSender<Ack>;

struct Ticket {
    position: Position,
    ack: Option<AckSender>,
}

/// Per-device admission control for the pipeline.
///
/// For any one device, at most one position is inside the chain at a
/// time and positions complete in exactly the order they were accepted;
/// devices do not serialize against each other. The queue table keys a
/// `VecDeque` per device: a present entry means the device is busy, the
/// head of the deque is the position in flight, and the entry is removed
/// only when the queue drains. `accept` spawns a runner task only when
/// it creates the entry, so a double-start cannot happen.
///
/// A runner pins the device in the cache for as long as the entry
/// exists, keeping its objects loaded across every queued position.
pub struct Sequencer<S: Storage> {
    pipeline: Arc<Pipeline<S>>,
    queues: DashMap<DeviceId, VecDeque<Ticket>>,
    running: AtomicUsize,
    drained: Notify,
}

impl<S: Storage> Sequencer<S> {
    pub fn new(pipeline: Arc<Pipeline<S>>) -> Arc<Self> {
        Arc::new(Self {
            pipeline,
            queues: DashMap::new(),
            running: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    /// Entry point from the transports. Appends the position to its
    /// device's queue; when the device was idle, starts a runner for it.
    /// Returns immediately either way.
    pub fn accept(self: &Arc<Self>, position: Position, ack: Option<AckSender>) {
        let device_id = position.device_id;
        let ticket = Ticket { position, ack };

        let start = match self.queues.entry(device_id) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().push_back(ticket);
                false
            }
            Entry::Vacant(vacant) => {
                vacant.insert(VecDeque::from([ticket]));
                true
            }
        };

        if start {
            self.running.fetch_add(1, Ordering::SeqCst);
            let sequencer = Arc::clone(self);
            tokio::spawn(async move {
                sequencer.run_device(device_id).await;
            });
        }
    }

    /// Whether the device currently has a position in flight or queued.
    pub fn busy(&self, device_id: DeviceId) -> bool {
        self.queues.contains_key(&device_id)
    }

    /// Wait until every device's queue has drained. Used by shutdown so
    /// in-flight positions finish their chain before the process exits.
    pub async fn drain(&self) {
        loop {
            let drained = self.drained.notified();
            if self.running.load(Ordering::SeqCst) == 0 {
                return;
            }
            drained.await;
        }
    }

    async fn run_device(self: Arc<Self>, device_id: DeviceId) {
        if let Err(error) = self.pipeline.cache().pin(device_id).await {
            // The chain still runs; stages degrade to their no-device
            // behavior and the position is still acknowledged.
            warn!(
                device_id = ?device_id,
                error = %error,
                "Failed to load device objects"
            );
        }

        loop {
            // The head stays queued while in flight; `accept` reads a
            // present entry as busy. A missing entry or empty queue here
            // means the single-runner invariant is broken, which is not
            // a recoverable condition.
            let ticket = {
                let queue = self
                    .queues
                    .get(&device_id)
                    .expect("queue entry vanished while its runner was active");
                let head = queue
                    .front()
                    .expect("queue empty while its runner was active");
                Ticket {
                    position: head.position.clone(),
                    ack: head.ack.clone(),
                }
            };

            let report = self.pipeline.process(ticket.position).await;

            info!(
                device_id = ?device_id,
                fix_time = %report.position.fix_time,
                filtered = report.filtered,
                events = report.events.len(),
                "Position processed"
            );

            if let Some(ack) = ticket.ack {
                // The transport may be gone; its acknowledgement is then
                // moot.
                let _ = ack.send(Ack {
                    device_id,
                    position_id: report.position.id,
                    fix_time: report.position.fix_time,
                    filtered: report.filtered,
                });
            }

            let more = {
                let mut queue = self
                    .queues
                    .get_mut(&device_id)
                    .expect("queue entry vanished while its runner was active");
                queue.pop_front();
                !queue.is_empty()
            };
            if more {
                continue;
            }
            // Removal checks emptiness under the entry lock: a position
            // accepted after the pop lands in the still-present entry
            // and keeps this runner alive instead of spawning a second.
            if self
                .queues
                .remove_if(&device_id, |_, queue| queue.is_empty())
                .is_some()
            {
                break;
            }
        }

        self.pipeline.cache().unpin(device_id);

        if self.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.drained.notify_waiters();
        }
    }
}
