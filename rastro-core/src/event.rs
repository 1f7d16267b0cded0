use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DeviceId, EventId, GeofenceId, MaintenanceId, PositionId, Value};

pub const TYPE_ALARM: &str = "alarm";
pub const TYPE_DEVICE_OVERSPEED: &str = "deviceOverspeed";
pub const TYPE_DEVICE_MOVING: &str = "deviceMoving";
pub const TYPE_DEVICE_STOPPED: &str = "deviceStopped";
pub const TYPE_GEOFENCE_ENTER: &str = "geofenceEnter";
pub const TYPE_GEOFENCE_EXIT: &str = "geofenceExit";
pub const TYPE_IGNITION_ON: &str = "ignitionOn";
pub const TYPE_IGNITION_OFF: &str = "ignitionOff";
pub const TYPE_DRIVER_CHANGED: &str = "driverChanged";
pub const TYPE_MAINTENANCE: &str = "maintenance";
pub const TYPE_COMMAND_RESULT: &str = "commandResult";
pub const TYPE_MEDIA: &str = "media";
pub const TYPE_FUEL_DROP: &str = "fuelDrop";
pub const TYPE_FUEL_INCREASE: &str = "fuelIncrease";

/// A detected occurrence tied to a position.
///
/// Events are created by a detector, persisted immediately, then matched
/// against notification rules. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Storage row id; 0 until persisted.
    #[serde(default)]
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    pub device_id: DeviceId,
    /// Position this event was detected on; 0 when the position was not
    /// stored (should not normally happen).
    pub position_id: PositionId,
    pub event_time: jiff::Timestamp,
    /// Related geofence, 0 for none.
    #[serde(default)]
    pub geofence_id: GeofenceId,
    /// Related maintenance schedule, 0 for none.
    #[serde(default)]
    pub maintenance_id: MaintenanceId,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Event {
    pub fn new(
        event_type: &str,
        device_id: DeviceId,
        position_id: PositionId,
        event_time: jiff::Timestamp,
    ) -> Self {
        Self {
            id: EventId(0),
            event_type: event_type.to_owned(),
            device_id,
            position_id,
            event_time,
            geofence_id: GeofenceId(0),
            maintenance_id: MaintenanceId(0),
            attributes: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_owned(), value.into());
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_i64)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}
