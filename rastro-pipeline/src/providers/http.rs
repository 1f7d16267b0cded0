use std::time::Duration;

use async_trait::async_trait;
use rastro_core::{Network, units};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::providers::{Geocoder, GeolocationProvider, LbsFix, SpeedLimitProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Nominatim-style reverse geocoder.
pub struct HttpGeocoder {
    url: String,
    client: reqwest::Client,
}

impl HttpGeocoder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: client(),
        }
    }
}

#[derive(Deserialize)]
struct GeocodeResponse {
    display_name: Option<String>,
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn address(&self, latitude: f64, longitude: f64) -> Result<String, ProviderError> {
        let response: GeocodeResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
                ("format", "json".to_owned()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.display_name.ok_or(ProviderError::NoResult)
    }
}

/// MLS-style geolocation provider: posts the visible radio environment,
/// receives a coordinate estimate.
pub struct HttpGeolocationProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpGeolocationProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: client(),
        }
    }
}

#[derive(serde::Serialize)]
struct GeolocationRequest<'a> {
    #[serde(rename = "cellTowers")]
    cell_towers: Vec<CellTowerRequest>,
    #[serde(rename = "wifiAccessPoints")]
    wifi_access_points: Vec<WifiRequest<'a>>,
}

#[derive(serde::Serialize)]
struct CellTowerRequest {
    #[serde(rename = "mobileCountryCode")]
    mcc: u16,
    #[serde(rename = "mobileNetworkCode")]
    mnc: u16,
    #[serde(rename = "locationAreaCode")]
    lac: u32,
    #[serde(rename = "cellId")]
    cid: u64,
}

#[derive(serde::Serialize)]
struct WifiRequest<'a> {
    #[serde(rename = "macAddress")]
    mac: &'a str,
    #[serde(rename = "signalStrength", skip_serializing_if = "Option::is_none")]
    signal: Option<i32>,
}

#[derive(Deserialize)]
struct GeolocationResponse {
    location: GeolocationPoint,
    accuracy: f64,
}

#[derive(Deserialize)]
struct GeolocationPoint {
    lat: f64,
    lng: f64,
}

#[async_trait]
impl GeolocationProvider for HttpGeolocationProvider {
    async fn locate(&self, network: &Network) -> Result<LbsFix, ProviderError> {
        let request = GeolocationRequest {
            cell_towers: network
                .cell_towers
                .iter()
                .map(|tower| CellTowerRequest {
                    mcc: tower.mcc,
                    mnc: tower.mnc,
                    lac: tower.lac,
                    cid: tower.cid,
                })
                .collect(),
            wifi_access_points: network
                .wifi_access_points
                .iter()
                .map(|point| WifiRequest {
                    mac: &point.mac,
                    signal: point.signal,
                })
                .collect(),
        };

        let response: GeolocationResponse = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(LbsFix {
            latitude: response.location.lat,
            longitude: response.location.lng,
            accuracy: response.accuracy,
        })
    }
}

/// Speed-limit lookup against a service returning the posted limit in
/// km/h for the nearest road segment.
pub struct HttpSpeedLimitProvider {
    url: String,
    client: reqwest::Client,
}

impl HttpSpeedLimitProvider {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: client(),
        }
    }
}

#[derive(Deserialize)]
struct SpeedLimitResponse {
    maxspeed: Option<f64>,
}

#[async_trait]
impl SpeedLimitProvider for HttpSpeedLimitProvider {
    async fn speed_limit(&self, latitude: f64, longitude: f64) -> Result<f64, ProviderError> {
        let response: SpeedLimitResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response
            .maxspeed
            .map(units::knots_from_kph)
            .ok_or(ProviderError::NoResult)
    }
}
