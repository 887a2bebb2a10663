//! Autodarts Stream Client
//!
//! Maintains the persistent connection to the Autodarts push channel,
//! authenticating with the current access token and driving the
//! [`MatchRelay`] state machine from inbound messages.
//!
//! # Stream URL
//!
//! `wss://api.autodarts.io/ms/v0/subscribe` with an
//! `Authorization: Bearer <token>` header. The token is re-read from the
//! [`TokenManager`] on every connection attempt since it may have rotated
//! while disconnected.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use crate::domain::round::Round;

use super::auth::TokenManager;
use super::messages::{StreamMessage, TopicRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::relay::{MatchRelay, RelayAction};

/// Production push-channel endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://api.autodarts.io/ms/v0/subscribe";

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the stream client.
#[derive(Debug, thiserror::Error)]
pub enum StreamClientError {
    /// No access token is currently available.
    #[error("no access token available")]
    MissingToken,

    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    MaxReconnectAttemptsExceeded,
}

// =============================================================================
// Stream Events
// =============================================================================

/// Events emitted by the stream client.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Connected and board topic subscribed.
    Connected,
    /// Disconnected from the server.
    Disconnected,
    /// Reconnecting to the server.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// A round was relayed from the active match.
    Round(Round),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the stream client.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Board whose matches are relayed.
    pub board_id: String,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl StreamClientConfig {
    /// Create a new configuration.
    #[must_use]
    pub fn new(url: String, board_id: String) -> Self {
        Self {
            url,
            board_id,
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Configuration for the production Autodarts endpoint.
    #[must_use]
    pub fn autodarts(board_id: String) -> Self {
        Self::new(DEFAULT_STREAM_URL.to_string(), board_id)
    }
}

// =============================================================================
// Connection Status
// =============================================================================

/// Coarse connection state, reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connected with the board topic subscribed.
    Connected,
    /// Waiting out a reconnect delay.
    Reconnecting,
}

impl ConnectionState {
    /// Status string for the health endpoint.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Shared counters describing the stream connection.
#[derive(Debug, Default)]
pub struct StreamStatus {
    state: parking_lot::RwLock<ConnectionState>,
    rounds_relayed: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl StreamStatus {
    /// Create a fresh status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the stream is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Count one relayed round.
    pub fn record_round(&self) {
        self.rounds_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of rounds relayed since startup.
    #[must_use]
    pub fn rounds_relayed(&self) -> u64 {
        self.rounds_relayed.load(Ordering::Relaxed)
    }

    /// Count one reconnection attempt.
    pub fn record_reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of reconnection attempts since startup.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Stream Client
// =============================================================================

/// WebSocket client for the Autodarts push channel.
///
/// Supervises the connection: on close or error the relay state resets
/// and the client reconnects with exponential backoff, fetching a fresh
/// token each time.
pub struct StreamClient {
    config: StreamClientConfig,
    tokens: Arc<TokenManager>,
    event_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Create a new stream client.
    #[must_use]
    pub const fn new(
        config: StreamClientConfig,
        tokens: Arc<TokenManager>,
        event_tx: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            tokens,
            event_tx,
            cancel,
        }
    }

    /// Run the connection loop until cancelled or retries are exhausted.
    ///
    /// # Errors
    ///
    /// Returns `MaxReconnectAttemptsExceeded` when the reconnect policy
    /// gives up; all other connection errors are handled internally.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("Stream client cancelled");
                return Ok(());
            }

            match self.connect_and_run(&mut policy).await {
                Ok(()) => {
                    tracing::info!("Stream connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stream connection error");

                    let _ = self.event_tx.send(StreamEvent::Disconnected).await;

                    if let Some(delay) = policy.next_delay() {
                        let attempt = policy.attempt_count();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "Reconnecting to Autodarts stream"
                        );

                        let _ = self
                            .event_tx
                            .send(StreamEvent::Reconnecting { attempt })
                            .await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("Stream client cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        return Err(StreamClientError::MaxReconnectAttemptsExceeded);
                    }
                }
            }
        }
    }

    /// Connect, subscribe the board topic and process messages until
    /// error or cancellation.
    async fn connect_and_run(
        &self,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), StreamClientError> {
        let token = self
            .tokens
            .current_token()
            .ok_or(StreamClientError::MissingToken)?;

        tracing::info!(url = %self.config.url, board_id = %self.config.board_id, "Connecting to Autodarts stream");

        let mut request = self.config.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| StreamClientError::ConnectionFailed(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = ws_stream.split();

        let mut relay = MatchRelay::new(self.config.board_id.clone());
        for action in relay.on_open() {
            self.perform_action(action, &mut write).await?;
        }

        let _ = self.event_tx.send(StreamEvent::Connected).await;
        policy.reset();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    relay.on_close();
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<StreamMessage>(text.as_str()) {
                                Ok(parsed) => {
                                    for action in relay.on_message(parsed) {
                                        self.perform_action(action, &mut write).await?;
                                    }
                                }
                                Err(error) => {
                                    tracing::debug!(error = %error, "Ignoring malformed stream message");
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Server sent close frame");
                            relay.on_close();
                            return Err(StreamClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore other message types
                        }
                        Some(Err(e)) => {
                            relay.on_close();
                            return Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            relay.on_close();
                            return Err(StreamClientError::ConnectionClosed);
                        }
                    }
                }
            }
        }
    }

    /// Perform one action requested by the relay state machine.
    async fn perform_action<W>(
        &self,
        action: RelayAction,
        write: &mut W,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        match action {
            RelayAction::Send(request) => self.send_request(write, &request).await,
            RelayAction::Publish(round) => {
                if self.event_tx.send(StreamEvent::Round(round)).await.is_err() {
                    tracing::warn!("Round event receiver dropped");
                }
                Ok(())
            }
        }
    }

    /// Send a subscribe/unsubscribe frame.
    async fn send_request<W>(
        &self,
        write: &mut W,
        request: &TopicRequest,
    ) -> Result<(), StreamClientError>
    where
        W: SinkExt<Message> + Unpin,
        W::Error: std::fmt::Display,
    {
        let json = serde_json::to_string(request).map_err(|e| {
            StreamClientError::ConnectionFailed(format!("failed to serialize request: {e}"))
        })?;

        tracing::debug!(channel = %request.channel, topic = %request.topic, "Sending topic request");

        write.send(Message::Text(json.into())).await.map_err(|e| {
            StreamClientError::ConnectionFailed(format!("failed to send request: {e}"))
        })?;

        Ok(())
    }
}
