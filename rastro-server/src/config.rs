use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use rastro_pipeline::PipelineConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub providers: ProvidersConfig,
    pub notify: NotifyConfig,
    pub pipeline: PipelineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::Memory,
            ingest: IngestConfig::default(),
            providers: ProvidersConfig::default(),
            notify: NotifyConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address for the HTTP health endpoint.
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8082".parse().expect("static address"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IngestConfig {
    /// Newline-delimited JSON fixes over TCP, one device per
    /// connection, each fix acknowledged after post-processing.
    Tcp {
        addr: SocketAddr,
        /// Create a device row on first contact from an unknown unique
        /// id instead of dropping its fixes.
        #[serde(default = "default_true")]
        register_unknown: bool,
    },
    /// Simulated devices driving a loop, for local runs without real
    /// trackers.
    Mock {
        device_count: usize,
        interval_secs: u64,
    },
}

fn default_true() -> bool {
    true
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::Mock {
            device_count: 3,
            interval_secs: 5,
        }
    }
}

/// External lookup services. Any unset URL leaves the corresponding
/// pipeline stage as a pass-through.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub geocode_url: Option<String>,
    pub geolocation_url: Option<String>,
    pub speed_limit_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// POST matched events here, in addition to the log channel.
    pub webhook_url: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_parses_to_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert!(matches!(config.ingest, IngestConfig::Mock { .. }));
    }

    #[test]
    fn tagged_sections_parse() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            type = "sqlite"
            path = "rastro.db"

            [ingest]
            type = "tcp"
            addr = "0.0.0.0:5055"

            [pipeline.filter]
            invalid = true
            "#,
        )
        .unwrap();

        assert!(matches!(config.storage, StorageConfig::Sqlite { .. }));
        match config.ingest {
            IngestConfig::Tcp {
                register_unknown, ..
            } => assert!(register_unknown),
            IngestConfig::Mock { .. } => panic!("expected tcp ingest"),
        }
        assert!(config.pipeline.filter.invalid);
    }
}
