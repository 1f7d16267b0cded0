use async_trait::async_trait;
use rastro_core::Position;
use tracing::debug;

use crate::config::ForwardConfig;
use crate::error::HandlerError;
use crate::handlers::{Outcome, PositionHandler};

/// Fires every position at an external HTTP sink, best effort. The
/// request runs in its own task: forwarding never blocks the chain and
/// a dead sink never fails it.
pub struct ForwardingHandler {
    url: Option<String>,
    client: reqwest::Client,
}

impl ForwardingHandler {
    pub fn new(config: &ForwardConfig) -> Self {
        Self {
            url: config.url.clone(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PositionHandler for ForwardingHandler {
    fn name(&self) -> &'static str {
        "forwarding"
    }

    async fn handle(&self, position: &mut Position) -> Result<Outcome, HandlerError> {
        let Some(url) = self.url.clone() else {
            return Ok(Outcome::Continue);
        };

        let client = self.client.clone();
        let payload = position.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) => {
                    debug!(status = %response.status(), "Position forwarded");
                }
                Err(error) => {
                    debug!(error = %error, "Position forwarding failed");
                }
            }
        });

        Ok(Outcome::Continue)
    }
}
