//! Autodarts Relay Binary
//!
//! Starts the live match score relay.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin autodarts-relay
//! ```
//!
//! # Environment Variables
//!
//! ## Required (environment or settings file)
//! - `AUTODARTS_USERNAME`: Autodarts account username
//! - `AUTODARTS_PASSWORD`: Autodarts account password
//! - `AUTODARTS_CLIENT_ID`: OAuth client id
//! - `AUTODARTS_BOARD_ID`: Board whose matches are relayed
//!
//! ## Optional
//! - `AUTODARTS_CLIENT_SECRET`: OAuth client secret
//! - `AUTODARTS_SETTINGS_FILE`: Settings file path (default: /home/pi/rgbserver/settings.json)
//! - `WEBSERVER_URL`: Display controller base URL (default: <http://localhost:5000>)
//! - `PORT`: HTTP server port (default: 8080)
//! - `AUTODARTS_KEYCLOAK_URL`: Identity provider base URL
//! - `AUTODARTS_STREAM_URL`: Push-channel WebSocket URL
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use autodarts_relay::infrastructure::autodarts::auth::TokenManager;
use autodarts_relay::infrastructure::autodarts::stream::{
    ConnectionState, StreamClient, StreamEvent, StreamStatus,
};
use autodarts_relay::infrastructure::broadcast::RoundHub;
use autodarts_relay::infrastructure::forward::Forwarder;
use autodarts_relay::infrastructure::http::{RelayHttpServer, RelayServerState};
use autodarts_relay::infrastructure::telemetry;
use autodarts_relay::{RelayConfig, RoundStore};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    telemetry::init();

    tracing::info!("Starting Autodarts relay");

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Authenticate before anything else; startup fails fast on bad
    // credentials.
    let tokens = Arc::new(
        TokenManager::initialize(
            config.keycloak_config(),
            config.credentials.username.clone(),
            config.credentials.password.clone(),
            config.token.tick,
        )
        .await?,
    );
    tracing::info!(user_id = %tokens.user_id(), "Authenticated with Autodarts");
    let token_handle = tokens.start();

    let store = Arc::new(RoundStore::new());
    let hub = Arc::new(RoundHub::with_defaults());
    let stream_status = Arc::new(StreamStatus::new());
    let forwarder = Arc::new(Forwarder::new(&config.forward_url)?);

    // Stream client feeding the event handler
    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>(256);
    let stream_client = Arc::new(StreamClient::new(
        config.stream_config(),
        Arc::clone(&tokens),
        event_tx,
        shutdown_token.clone(),
    ));

    let handler_store = Arc::clone(&store);
    let handler_hub = Arc::clone(&hub);
    let handler_status = Arc::clone(&stream_status);
    let handler_forwarder = Arc::clone(&forwarder);
    tokio::spawn(async move {
        handle_stream_events(
            event_rx,
            handler_store,
            handler_hub,
            handler_status,
            handler_forwarder,
        )
        .await;
    });

    let stream_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = stream_client.run().await {
            tracing::error!(error = %e, "Stream client error");
            stream_shutdown.cancel();
        }
    });

    // HTTP surface
    let server_state = Arc::new(RelayServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&store),
        Arc::clone(&hub),
        Arc::clone(&stream_status),
    ));
    let http_server = RelayHttpServer::new(
        config.server.http_port,
        server_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tracing::info!("Relay ready");

    await_shutdown(shutdown_token).await;

    token_handle.stop().await;

    tracing::info!("Relay stopped");
    Ok(())
}

/// Handle events from the stream client, fanning rounds out to the
/// store, the broadcast hub and the display controller.
async fn handle_stream_events(
    mut rx: mpsc::Receiver<StreamEvent>,
    store: Arc<RoundStore>,
    hub: Arc<RoundHub>,
    status: Arc<StreamStatus>,
    forwarder: Arc<Forwarder>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Connected => {
                status.set_state(ConnectionState::Connected);
                tracing::info!("Autodarts stream connected");
            }
            StreamEvent::Disconnected => {
                status.set_state(ConnectionState::Disconnected);
                tracing::warn!("Autodarts stream disconnected");
            }
            StreamEvent::Reconnecting { attempt } => {
                status.set_state(ConnectionState::Reconnecting);
                status.record_reconnect_attempt();
                tracing::info!(attempt, "Autodarts stream reconnecting");
            }
            StreamEvent::Round(round) => {
                status.record_round();
                store.publish(round.clone());
                let _ = hub.send_round(round.clone());
                forwarder.spawn_forward(round);
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        board_id = %config.board_id,
        http_port = config.server.http_port,
        forward_url = %config.forward_url,
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.stream_url,
        keycloak_url = %config.keycloak.base_url,
        realm = %config.keycloak.realm,
        "Autodarts endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
