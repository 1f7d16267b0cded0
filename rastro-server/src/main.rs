use std::path::PathBuf;
use std::sync::Arc;

use axum::{Router, routing::get};
use clap::Parser;
use rastro_pipeline::providers::http::{
    HttpGeocoder, HttpGeolocationProvider, HttpSpeedLimitProvider,
};
use rastro_pipeline::{
    DeviceCache, LogChannel, MemoryStorage, NotificationChannel, Notifier, Pipeline, Providers,
    Sequencer, SqliteStorage, Storage, WebhookChannel,
};
use rastro_server::ingest::IngestSource;
use rastro_server::ingest::mock::MockIngestSource;
use rastro_server::ingest::tcp::TcpIngestSource;
use rastro_server::{Config, IngestConfig, ProvidersConfig, StorageConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "rastro-server")]
#[command(about = "Rastro GPS tracking server")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "rastro.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "rastro_server=info,rastro_pipeline=info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        info!(path = ?cli.config, "Loading configuration");
        Config::load(&cli.config)?
    } else {
        info!("No configuration file found, using defaults");
        Config::default()
    };

    match config.storage {
        StorageConfig::Memory => {
            info!("Using in-memory storage");
            run_server(config, MemoryStorage::default()).await
        }
        StorageConfig::Sqlite { ref path } => {
            info!(path = ?path, "Using SQLite storage");
            let storage = SqliteStorage::new(path.to_string_lossy().as_ref()).await?;
            run_server(config, storage).await
        }
    }
}

async fn run_server<S: Storage>(config: Config, storage: S) -> color_eyre::Result<()> {
    let storage = Arc::new(storage);
    let cache = Arc::new(DeviceCache::new(
        storage.clone(),
        config.pipeline.attributes.clone(),
    ));

    let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
    if let Some(url) = &config.notify.webhook_url {
        channels.push(Arc::new(WebhookChannel::new(url)));
    }
    let notifier = Arc::new(Notifier::new(cache.clone(), channels));

    let pipeline = Arc::new(Pipeline::new(
        storage.clone(),
        cache,
        build_providers(&config.providers),
        notifier,
        &config.pipeline,
    ));
    let sequencer = Sequencer::new(pipeline);

    let cancel = CancellationToken::new();

    match &config.ingest {
        IngestConfig::Tcp {
            addr,
            register_unknown,
        } => {
            let source = TcpIngestSource::new(*addr, storage.clone(), *register_unknown);
            run_ingest(source, sequencer, cancel, &config).await
        }
        IngestConfig::Mock {
            device_count,
            interval_secs,
        } => {
            let source = MockIngestSource::new(storage.clone(), *device_count, *interval_secs);
            run_ingest(source, sequencer, cancel, &config).await
        }
    }
}

fn build_providers(config: &ProvidersConfig) -> Providers {
    Providers {
        geocoder: config
            .geocode_url
            .as_ref()
            .map(|url| Arc::new(HttpGeocoder::new(url)) as _),
        geolocation: config
            .geolocation_url
            .as_ref()
            .map(|url| Arc::new(HttpGeolocationProvider::new(url)) as _),
        speed_limit: config
            .speed_limit_url
            .as_ref()
            .map(|url| Arc::new(HttpSpeedLimitProvider::new(url)) as _),
    }
}

async fn run_ingest<I: IngestSource, S: Storage>(
    source: I,
    sequencer: Arc<Sequencer<S>>,
    cancel: CancellationToken,
    config: &Config,
) -> color_eyre::Result<()> {
    let mut ingest_rx = source.start(cancel.clone()).await?;

    // Collector: feed decoded fixes into the per-device sequencer.
    let sequencer_for_collector = sequencer.clone();
    let cancel_for_collector = cancel.clone();
    let collector = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel_for_collector.cancelled() => break,
                item = ingest_rx.recv() => {
                    let Some(item) = item else { break };
                    sequencer_for_collector.accept(item.position, item.ack);
                }
            }
        }
    });

    let axum_app = Router::new().route("/health", get(health_handler));
    let axum_listener = TcpListener::bind(config.server.http_addr).await?;
    info!(http_addr = %config.server.http_addr, "HTTP server listening");

    let cancel_for_http = cancel.clone();
    tokio::select! {
        result = axum::serve(axum_listener, axum_app).with_graceful_shutdown(async move {
            cancel_for_http.cancelled().await;
        }) => {
            if let Err(e) = result {
                error!(error = ?e, "HTTP server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    }

    let _ = collector.await;
    // Let in-flight chains finish so nothing is acknowledged twice or
    // dropped mid-stage on the way out.
    sequencer.drain().await;

    info!("rastro-server shut down complete");
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}
