//! Per-device position processing for rastro.
//!
//! A decoded [`rastro_core::Position`] enters through the
//! [`sequencer::Sequencer`], which guarantees strict FIFO processing per
//! device. Each position runs through the ordered stage chain of
//! [`pipeline::Pipeline`] (any stage may filter it out), then through
//! the event detectors, and every detected event is persisted and fanned
//! out through [`notify::Notifier`]. The fix is acknowledged back to its
//! transport on every path.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod expr;
pub mod handlers;
pub mod motion;
pub mod notify;
pub mod pipeline;
pub mod providers;
pub mod sequencer;
pub mod storage;

pub use cache::DeviceCache;
pub use config::PipelineConfig;
pub use notify::{LogChannel, NotificationChannel, Notifier, WebhookChannel};
pub use pipeline::{Pipeline, ProcessReport};
pub use providers::Providers;
pub use sequencer::{Ack, AckSender, Sequencer};
pub use storage::Storage;
pub use storage::memory::MemoryStorage;
pub use storage::sqlite::SqliteStorage;
