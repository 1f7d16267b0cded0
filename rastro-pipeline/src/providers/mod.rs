pub mod http;

use async_trait::async_trait;
use rastro_core::Network;

use crate::error::ProviderError;

/// Coordinates resolved from a radio environment.
#[derive(Debug, Clone, Copy)]
pub struct LbsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// Reverse geocoding: coordinates to street address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn address(&self, latitude: f64, longitude: f64) -> Result<String, ProviderError>;
}

/// LBS resolution: cell towers / WiFi access points to coordinates.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn locate(&self, network: &Network) -> Result<LbsFix, ProviderError>;
}

/// Posted speed limit for the road segment at a coordinate, in knots.
#[async_trait]
pub trait SpeedLimitProvider: Send + Sync {
    async fn speed_limit(&self, latitude: f64, longitude: f64) -> Result<f64, ProviderError>;
}

/// The set of external lookup providers wired into a pipeline. Any of
/// them may be absent; the corresponding stages then pass positions
/// through untouched.
#[derive(Clone, Default)]
pub struct Providers {
    pub geocoder: Option<std::sync::Arc<dyn Geocoder>>,
    pub geolocation: Option<std::sync::Arc<dyn GeolocationProvider>>,
    pub speed_limit: Option<std::sync::Arc<dyn SpeedLimitProvider>>,
}
