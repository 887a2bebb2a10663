//! Round Forwarding
//!
//! Best-effort HTTP forwarding of relayed rounds to the display
//! controller. Failures are logged and never affect the relay.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::round::Round;

/// Timeout for a single forwarding call.
pub const FORWARD_TIMEOUT: Duration = Duration::from_secs(2);

/// Path the display controller accepts round updates on.
const UPDATE_PATH: &str = "/dart/update";

/// Errors from the downstream sink.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The sink was unreachable or timed out.
    #[error("forwarding request failed: {0}")]
    Request(String),

    /// The sink answered with a non-success status.
    #[error("forwarding rejected with status {0}")]
    Status(u16),
}

/// Fire-and-forget HTTP client for the display controller.
#[derive(Debug, Clone)]
pub struct Forwarder {
    http: reqwest::Client,
    endpoint: String,
}

impl Forwarder {
    /// Create a forwarder posting to `{base_url}/dart/update`.
    ///
    /// # Errors
    ///
    /// Returns `ForwardError::Request` if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ForwardError> {
        let http = reqwest::Client::builder()
            .timeout(FORWARD_TIMEOUT)
            .build()
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: format!("{}{UPDATE_PATH}", base_url.trim_end_matches('/')),
        })
    }

    /// Forward one round to the sink.
    ///
    /// # Errors
    ///
    /// Returns a [`ForwardError`] when the request fails or the sink
    /// rejects it.
    pub async fn forward(&self, round: &Round) -> Result<(), ForwardError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(round)
            .send()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ForwardError::Status(status.as_u16()))
        }
    }

    /// Forward a round on a detached task, logging any failure.
    pub fn spawn_forward(self: &Arc<Self>, round: Round) {
        let forwarder = Arc::clone(self);
        tokio::spawn(async move {
            match forwarder.forward(&round).await {
                Ok(()) => tracing::debug!(endpoint = %forwarder.endpoint, "Forwarded round"),
                Err(error) => {
                    tracing::error!(error = %error, endpoint = %forwarder.endpoint, "Forwarding round failed");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_derived_from_base_url() {
        let forwarder = Forwarder::new("http://localhost:5000").unwrap();
        assert_eq!(forwarder.endpoint, "http://localhost:5000/dart/update");
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let forwarder = Forwarder::new("http://display.local/").unwrap();
        assert_eq!(forwarder.endpoint, "http://display.local/dart/update");
    }
}
