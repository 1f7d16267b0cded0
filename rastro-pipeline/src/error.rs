/// Error raised by a position handler or event detector.
///
/// Only programming and storage errors surface here; recoverable
/// enrichment failures (geocoder timeouts and the like) are logged and
/// swallowed inside the stage that hit them.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Other(String),
}

impl HandlerError {
    pub fn storage(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(error))
    }
}

/// Error from an external lookup provider (geocoder, geolocation,
/// speed limit).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("no result")]
    NoResult,
}

/// Error from a notification channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}
