pub mod config;
pub mod ingest;

pub use config::{Config, IngestConfig, NotifyConfig, ProvidersConfig, ServerConfig, StorageConfig};
pub use ingest::{IngestItem, IngestSource};
pub use ingest::mock::MockIngestSource;
pub use ingest::tcp::TcpIngestSource;
