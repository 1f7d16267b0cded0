use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod event;
pub mod geo;
pub mod position;
pub mod units;

pub use event::Event;
pub use position::{Network, Position, Value};

/// Unique identifier for a tracked device. Assigned by storage; 0 means
/// the object has not been persisted yet.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DeviceId(pub i64);

/// Unique identifier for a stored position row.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PositionId(pub i64);

/// Unique identifier for a stored event row.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventId(pub i64);

/// Unique identifier for a device group.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(pub i64);

/// Unique identifier for a geofence.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GeofenceId(pub i64);

/// Unique identifier for a driver.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DriverId(pub i64);

/// Unique identifier for a maintenance schedule.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct MaintenanceId(pub i64);

/// Unique identifier for a notification rule.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NotificationId(pub i64);

/// A registered tracker device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable identity of this device.
    pub id: DeviceId,
    /// Identifier the device reports on the wire (IMEI or similar).
    pub unique_id: String,
    /// Display name.
    pub name: String,
    /// Owning group, 0 for none.
    pub group_id: GroupId,
    /// Free-form per-device settings (speed limits, filter skip lists, ...).
    pub attributes: BTreeMap<String, Value>,
    /// Trip/parking detection state, persisted across restarts.
    pub motion: MotionColumns,
}

impl Device {
    pub fn new(id: DeviceId, unique_id: impl Into<String>) -> Self {
        Self {
            id,
            unique_id: unique_id.into(),
            name: String::new(),
            group_id: GroupId(0),
            attributes: BTreeMap::new(),
            motion: MotionColumns::default(),
        }
    }
}

/// Persisted motion/trip columns of a device.
///
/// `streak` means a candidate trip or parking interval is open but has not
/// yet crossed the confirmation thresholds; `state` means a trip is
/// confirmed in progress. These are written back with a partial column
/// update only when they change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionColumns {
    pub streak: bool,
    pub state: bool,
    /// Fix time of the anchor position of the open streak.
    pub time: Option<jiff::Timestamp>,
    /// Total-distance reading at the anchor position.
    pub distance: f64,
    /// Stored id of the anchor position.
    pub position_id: PositionId,
    /// Whether the device is currently idling (engine on, not moving).
    pub idle_state: bool,
    /// Accumulated idle time in the current parked period.
    pub idle_time: jiff::SignedDuration,
    /// Fix time at which the current idle period started.
    pub idle_start: Option<jiff::Timestamp>,
}

/// A group of devices. Groups nest; attribute lookups walk up the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    /// Parent group, 0 for a root group.
    pub group_id: GroupId,
    pub attributes: BTreeMap<String, Value>,
}

/// A named geographic region evaluated against every position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Geofence {
    pub id: GeofenceId,
    pub name: String,
    pub geometry: geo::Geometry,
    /// Per-fence settings, e.g. a `speedLimit` override.
    pub attributes: BTreeMap<String, Value>,
}

impl Geofence {
    /// Whether the given coordinate lies inside this fence.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.geometry.contains(latitude, longitude)
    }
}

/// A driver identified by an RFID/iButton unique id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: DriverId,
    pub name: String,
    /// Value the tracker reports when this driver badges in.
    pub unique_id: String,
    pub attributes: BTreeMap<String, Value>,
}

/// A periodic service counter for a device.
///
/// Fires a maintenance event whenever the watched attribute crosses a
/// multiple of `period` past `start` (e.g. every 10000 km of odometer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Maintenance {
    pub id: MaintenanceId,
    pub name: String,
    /// Position attribute to watch, e.g. `totalDistance` or `hours`.
    pub attribute: String,
    pub start: f64,
    pub period: f64,
}

/// A rule connecting detected events to notification channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRule {
    pub id: NotificationId,
    /// Event type this rule matches.
    pub event_type: String,
    /// Restrict to one geofence, 0 for any.
    pub geofence_id: GeofenceId,
    /// Channel names to dispatch to, e.g. `log`, `webhook`.
    pub channels: Vec<String>,
    /// Drop repeat notifications for the same device within this many
    /// seconds. 0 disables de-duplication.
    pub min_interval_secs: u64,
}
