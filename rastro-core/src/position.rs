use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{DeviceId, GeofenceId, PositionId};

/// Heterogeneous attribute value.
///
/// Variant order matters for untagged deserialization: booleans and
/// integers must be tried before floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Number(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Well-known attribute keys.
///
/// Keys are namespaced constants; the absence of a key is semantically
/// different from a false/zero value.
pub mod keys {
    /// Distance from the previous stored position, meters.
    pub const DISTANCE: &str = "distance";
    /// Running distance total, meters.
    pub const TOTAL_DISTANCE: &str = "totalDistance";
    /// Device-reported odometer, meters.
    pub const ODOMETER: &str = "odometer";
    /// Instantaneous moving flag.
    pub const MOTION: &str = "motion";
    /// Accumulated engine hours, milliseconds.
    pub const HOURS: &str = "hours";
    /// Ignition input state.
    pub const IGNITION: &str = "ignition";
    /// Engine RPM.
    pub const RPM: &str = "rpm";
    /// Alarm sub-type reported by the decoder.
    pub const ALARM: &str = "alarm";
    /// Badge id of the driver currently signed in.
    pub const DRIVER_UNIQUE_ID: &str = "driverUniqueId";
    /// Coordinates were resolved from radio environment, not GNSS.
    pub const APPROXIMATE: &str = "approximate";
    /// Posted speed limit for the current road segment, knots.
    pub const SPEED_LIMIT: &str = "speedLimit";
    /// Fuel level, percent or liters depending on the device.
    pub const FUEL_LEVEL: &str = "fuel";
    /// Path of a media file attached to this fix.
    pub const MEDIA: &str = "media";
    /// Outcome of a previously sent command.
    pub const COMMAND_RESULT: &str = "result";
    /// Accumulated idle time attached to stop events, milliseconds.
    pub const IDLE_TIME: &str = "idleTime";
    /// Dwell duration attached to geofence exit events, milliseconds.
    pub const DWELL_TIME: &str = "dwellTime";
    /// Overspeeding speed attached to overspeed events, knots.
    pub const SPEED: &str = "speed";
}

/// A visible GSM cell tower.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellTower {
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u32,
    pub cid: u64,
    pub signal: Option<i32>,
}

/// A visible WiFi access point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WifiAccessPoint {
    pub mac: String,
    pub signal: Option<i32>,
}

/// Radio environment reported alongside a fix, used for LBS geolocation
/// when no usable GNSS coordinates are present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Network {
    #[serde(default)]
    pub cell_towers: Vec<CellTower>,
    #[serde(default)]
    pub wifi_access_points: Vec<WifiAccessPoint>,
}

/// One GPS/telemetry fix from one device.
///
/// Created by a protocol decoder, mutated in place by each pipeline
/// stage, then persisted. `device_id` and `fix_time` never change once
/// the fix enters the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Storage row id; 0 until persisted.
    #[serde(default)]
    pub id: PositionId,
    pub device_id: DeviceId,
    /// Tag of the decoder that produced this fix.
    #[serde(default)]
    pub protocol: String,
    /// Ingestion time on the server.
    pub server_time: jiff::Timestamp,
    /// Message timestamp reported by the device.
    pub device_time: jiff::Timestamp,
    /// GNSS fix timestamp reported by the device.
    pub fix_time: jiff::Timestamp,
    /// GNSS fix quality flag.
    pub valid: bool,
    /// Degrees, -90..90.
    pub latitude: f64,
    /// Degrees, -180..180.
    pub longitude: f64,
    /// Meters above sea level.
    #[serde(default)]
    pub altitude: f64,
    /// Knots.
    #[serde(default)]
    pub speed: f64,
    /// Course over ground, degrees 0..360.
    #[serde(default)]
    pub course: f64,
    /// Reported horizontal accuracy, meters.
    #[serde(default)]
    pub accuracy: f64,
    /// Resolved street address, when reverse geocoding has run.
    #[serde(default)]
    pub address: Option<String>,
    /// Ids of the geofences containing this fix.
    #[serde(default)]
    pub geofence_ids: Vec<GeofenceId>,
    /// Protocol-specific and computed attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Radio environment for LBS resolution.
    #[serde(default)]
    pub network: Option<Network>,
    /// Set by decoders when the fix is known stale and coordinates
    /// should be resolved from the network info instead.
    #[serde(default)]
    pub outdated: bool,
}

impl Position {
    /// A blank fix for the given device with all timestamps set to `time`.
    pub fn new(device_id: DeviceId, time: jiff::Timestamp) -> Self {
        Self {
            id: PositionId(0),
            device_id,
            protocol: String::new(),
            server_time: time,
            device_time: time,
            fix_time: time,
            valid: true,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            speed: 0.0,
            course: 0.0,
            accuracy: 0.0,
            address: None,
            geofence_ids: Vec::new(),
            attributes: BTreeMap::new(),
            network: None,
            outdated: false,
        }
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    pub fn double(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }

    pub fn integer(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Value::as_i64)
    }

    pub fn boolean(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    pub fn string(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.attributes.insert(key.to_owned(), value.into());
    }
}
