//! HTTP Surface
//!
//! Serves the relayed round to displays and reports service health.
//!
//! # Endpoints
//!
//! - `GET /round` - Latest relayed round as JSON (`{}` before the first round)
//! - `GET /ws` - WebSocket push of rounds as they arrive
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (checks the stream connection)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::round::RoundStore;
use crate::infrastructure::autodarts::stream::StreamStatus;
use crate::infrastructure::broadcast::RoundHub;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Push-channel connection status.
    pub stream: StreamInfo,
    /// Live listener statistics.
    pub listeners: ListenerStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Stream connected, rounds flowing.
    Healthy,
    /// Stream not connected.
    Unhealthy,
}

/// Push-channel connection status.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// Connection state.
    pub state: String,
    /// Whether the stream is connected.
    pub connected: bool,
    /// Rounds relayed since startup.
    pub rounds_relayed: u64,
    /// Reconnection attempts since startup.
    pub reconnect_attempts: u32,
}

/// Live listener information.
#[derive(Debug, Clone, Serialize)]
pub struct ListenerStatus {
    /// Active WebSocket push receivers.
    pub websocket_receivers: usize,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the relay HTTP server.
pub struct RelayServerState {
    version: String,
    started_at: Instant,
    store: Arc<RoundStore>,
    hub: Arc<RoundHub>,
    stream: Arc<StreamStatus>,
}

impl RelayServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(
        version: String,
        store: Arc<RoundStore>,
        hub: Arc<RoundHub>,
        stream: Arc<StreamStatus>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            store,
            hub,
            stream,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Round and health HTTP server.
pub struct RelayHttpServer {
    port: u16,
    state: Arc<RelayServerState>,
    cancel: CancellationToken,
}

impl RelayHttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(
        port: u16,
        state: Arc<RelayServerState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the relay router. Exposed for integration tests.
#[must_use]
pub fn router(state: Arc<RelayServerState>) -> Router {
    Router::new()
        .route("/round", get(round_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn round_handler(State(state): State<Arc<RelayServerState>>) -> impl IntoResponse {
    Json(state.store.to_json())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<RelayServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| push_rounds(socket, state))
}

/// Push every relayed round to one WebSocket listener, starting with the
/// current round if a match is already underway.
async fn push_rounds(mut socket: WebSocket, state: Arc<RelayServerState>) {
    let mut rx = state.hub.subscribe();

    if let Some(round) = state.store.latest()
        && let Ok(json) = serde_json::to_string(&round)
        && socket.send(Message::Text(json.into())).await.is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            round = rx.recv() => {
                match round {
                    Ok(round) => {
                        let Ok(json) = serde_json::to_string(&round) else {
                            continue;
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            tracing::debug!("WebSocket listener disconnected");
                            return;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "WebSocket listener lagged, skipping rounds");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                // Only close frames and errors matter from listeners
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn health_handler(State(state): State<Arc<RelayServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<RelayServerState>>) -> impl IntoResponse {
    if state.stream.is_connected() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

fn build_health_response(state: &RelayServerState) -> HealthResponse {
    let connection_state = state.stream.state();
    let connected = state.stream.is_connected();

    let status = if connected {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        stream: StreamInfo {
            state: connection_state.as_str().to_string(),
            connected,
            rounds_relayed: state.stream.rounds_relayed(),
            reconnect_attempts: state.stream.reconnect_attempts(),
        },
        listeners: ListenerStatus {
            websocket_receivers: state.hub.receiver_count(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
