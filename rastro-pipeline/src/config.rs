use std::collections::BTreeMap;

use jiff::SignedDuration;
use rastro_core::Value;
use serde::Deserialize;

/// All tunables of the position processing pipeline.
///
/// Every field has a usable default so a pipeline can be built from an
/// empty config table. Durations are expressed as whole seconds in the
/// config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub filter: FilterConfig,
    pub time: TimeConfig,
    pub coordinates: CoordinatesConfig,
    pub hemisphere: HemisphereConfig,
    pub geolocation: GeolocationConfig,
    pub geocode: GeocodeConfig,
    pub motion: MotionConfig,
    pub overspeed: OverspeedConfig,
    pub fuel: FuelConfig,
    pub forward: ForwardConfig,
    pub processing: ProcessingConfig,
    /// Server-level attribute defaults, the last step of the
    /// device -> group -> server lookup chain.
    pub attributes: BTreeMap<String, Value>,
}

/// Rules for dropping positions before they reach persistence.
/// All rules are off by default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Drop fixes without a valid GNSS flag or with out-of-range
    /// coordinates.
    pub invalid: bool,
    /// Drop fixes at exactly 0,0.
    pub zero: bool,
    /// Drop fixes whose fix time equals the last stored fix time and
    /// that add no new attributes.
    pub duplicate: bool,
    /// Drop fixes more than this far in the future. 0 disables.
    pub future_secs: u64,
    /// Drop fixes with reported accuracy worse than this. 0 disables.
    pub accuracy: f64,
    /// Drop fixes whose coordinates came from LBS resolution.
    pub approximate: bool,
    /// Drop fixes with zero speed.
    pub stationary: bool,
    /// Drop fixes closer than this to the last stored fix, meters.
    /// 0 disables.
    pub min_distance: f64,
    /// Drop fixes arriving sooner than this after the last stored fix.
    /// 0 disables.
    pub min_period_secs: u64,
    /// Drop fixes implying a speed between consecutive fixes above this
    /// many knots. 0 disables.
    pub max_speed: f64,
    /// Let an otherwise-filtered fix through anyway once this much time
    /// has passed since the last stored fix. 0 disables.
    pub skip_limit_secs: u64,
    /// Honor the per-device `filter.skipAttributes` attribute: a fix
    /// carrying any listed attribute is never filtered as
    /// duplicate/stationary/min-distance.
    pub skip_attributes: bool,
}

impl FilterConfig {
    pub fn future(&self) -> SignedDuration {
        SignedDuration::from_secs(self.future_secs as i64)
    }

    pub fn min_period(&self) -> SignedDuration {
        SignedDuration::from_secs(self.min_period_secs as i64)
    }

    pub fn skip_limit(&self) -> SignedDuration {
        SignedDuration::from_secs(self.skip_limit_secs as i64)
    }
}

/// Device clock handling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    pub mode: TimeMode,
    /// Skew beyond which `adjust` mode substitutes server time.
    pub max_skew_secs: u64,
    /// Drop fixes older than this relative to server time. 0 disables.
    pub max_age_secs: u64,
}

impl TimeConfig {
    pub fn max_skew(&self) -> SignedDuration {
        SignedDuration::from_secs(self.max_skew_secs as i64)
    }

    pub fn max_age(&self) -> SignedDuration {
        SignedDuration::from_secs(self.max_age_secs as i64)
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            mode: TimeMode::Off,
            max_skew_secs: 600,
            max_age_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeMode {
    /// Trust device clocks (week rollover is still corrected).
    Off,
    /// Substitute server time when the device clock is off by more than
    /// the configured skew.
    Adjust,
    /// Always substitute server time.
    Server,
}

/// GPS-jitter and jump suppression for computed distances.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoordinatesConfig {
    /// Enable snapping of jittery or implausible fixes to the previous
    /// coordinates.
    pub filter: bool,
    /// Below this distance from the last fix, meters, coordinates snap
    /// back and the step distance becomes 0.
    pub min_error: f64,
    /// Above this distance, an invalid fix snaps back likewise.
    /// 0 disables the upper bound.
    pub max_error: f64,
    /// Derive the running total from the device odometer when present.
    pub use_odometer: bool,
}

/// Forced hemisphere for decoders that report unsigned coordinates.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HemisphereConfig {
    /// "N" or "S".
    pub latitude: Option<String>,
    /// "E" or "W".
    pub longitude: Option<String>,
}

/// LBS resolution of fixes without usable GNSS coordinates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Also resolve fixes flagged invalid, not only outdated ones.
    pub process_invalid: bool,
    /// How long a resolved radio environment stays cached.
    pub cache_ttl_secs: u64,
}

impl GeolocationConfig {
    pub fn cache_ttl(&self) -> SignedDuration {
        SignedDuration::from_secs(self.cache_ttl_secs as i64)
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            process_invalid: false,
            cache_ttl_secs: 12 * 60 * 60,
        }
    }
}

/// Reverse geocoding.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeocodeConfig {
    /// Defer address resolution until a consumer asks for it instead of
    /// resolving during the pipeline.
    pub on_request: bool,
}

/// Trip/parking detection thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Speed above which a fix counts as moving when the decoder did not
    /// report a motion flag, knots.
    pub speed_threshold: f64,
    /// A trip is confirmed once a candidate streak covers at least this
    /// much time...
    pub min_trip_duration_secs: u64,
    /// ...and at least this much distance, meters.
    pub min_trip_distance: f64,
    /// Parking is confirmed once a candidate streak lasts this long.
    pub min_parking_duration_secs: u64,
    /// A silence of at least this long resets any open streak without
    /// emitting an event.
    pub no_data_gap_secs: u64,
    /// Use the ignition attribute as the moving signal where available,
    /// and confirm parking immediately on ignition-off.
    pub use_ignition: bool,
    /// RPM above which the engine counts as running for idle detection.
    pub idle_rpm_threshold: f64,
    /// Gaps between fixes longer than this are not counted as idle time.
    pub idle_max_gap_secs: u64,
    /// Idle periods shorter than this are discarded.
    pub idle_min_duration_secs: u64,
}

impl MotionConfig {
    pub fn min_trip_duration(&self) -> SignedDuration {
        SignedDuration::from_secs(self.min_trip_duration_secs as i64)
    }

    pub fn min_parking_duration(&self) -> SignedDuration {
        SignedDuration::from_secs(self.min_parking_duration_secs as i64)
    }

    pub fn no_data_gap(&self) -> SignedDuration {
        SignedDuration::from_secs(self.no_data_gap_secs as i64)
    }

    pub fn idle_max_gap(&self) -> SignedDuration {
        SignedDuration::from_secs(self.idle_max_gap_secs as i64)
    }

    pub fn idle_min_duration(&self) -> SignedDuration {
        SignedDuration::from_secs(self.idle_min_duration_secs as i64)
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 0.01,
            min_trip_duration_secs: 300,
            min_trip_distance: 500.0,
            min_parking_duration_secs: 300,
            no_data_gap_secs: 3600,
            use_ignition: false,
            idle_rpm_threshold: 0.0,
            idle_max_gap_secs: 600,
            idle_min_duration_secs: 120,
        }
    }
}

/// Overspeed detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverspeedConfig {
    /// The speed must stay above the limit for at least this long
    /// before an event fires.
    pub min_duration_secs: u64,
    /// Fire once and stay armed until the speed drops below the limit,
    /// instead of firing again on every qualifying streak.
    pub not_repeat: bool,
    /// When several containing geofences carry a speed limit, pick the
    /// lowest instead of the highest.
    pub prefer_lowest: bool,
}

impl OverspeedConfig {
    pub fn min_duration(&self) -> SignedDuration {
        SignedDuration::from_secs(self.min_duration_secs as i64)
    }
}

impl Default for OverspeedConfig {
    fn default() -> Self {
        Self {
            min_duration_secs: 15,
            not_repeat: false,
            prefer_lowest: true,
        }
    }
}

/// Fuel-level jump detection. Thresholds of 0 disable the detector.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FuelConfig {
    pub drop_threshold: f64,
    pub increase_threshold: f64,
}

/// Best-effort forwarding of every processed position to an external
/// sink.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub url: Option<String>,
}

/// Attribute computation and bookkeeping stages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// User-defined attribute expressions.
    pub computed: Vec<ComputedAttribute>,
    /// Accumulate engine hours while ignition stays on.
    pub engine_hours: bool,
    /// Attribute keys carried forward from the last stored position
    /// when a fix does not repeat them.
    pub copy_attributes: Vec<String>,
}

/// One user-defined expression evaluated against each position.
#[derive(Debug, Clone, Deserialize)]
pub struct ComputedAttribute {
    /// Destination attribute (or position field for the well-known
    /// names: valid, latitude, longitude, altitude, speed, course,
    /// accuracy, address).
    pub attribute: String,
    pub expression: String,
    /// Evaluate after enrichment stages instead of before them, so the
    /// expression can reference computed fields like distance.
    #[serde(default)]
    pub late: bool,
}
