#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Autodarts Relay - Live Match Score Relay
//!
//! A relay service that keeps an authenticated Autodarts session alive,
//! follows the matches played on one board over the Autodarts push
//! channel and republishes the latest round to local consumers such as
//! an LED matrix display controller.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Round data and the latest-round store
//! - **Infrastructure**: Adapters and external integrations
//!   - `autodarts`: Keycloak credential lifecycle, push-channel client
//!     and the subscription cascade state machine
//!   - `broadcast`: Channel-based round distribution
//!   - `forward`: Best-effort HTTP push to the display controller
//!   - `http`: Round and health HTTP endpoints
//!   - `config`: Configuration loading
//!
//! # Data Flow
//!
//! ```text
//! Autodarts push WS ──▶ MatchRelay ──▶ RoundStore ──▶ GET /round
//!                                 │
//!                                 ├──▶ RoundHub ────▶ GET /ws listeners
//!                                 └──▶ Forwarder ───▶ display controller
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Round types with no external integrations.
pub mod domain;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::round::{Round, RoundStore};

// Infrastructure config
pub use infrastructure::config::{
    AutodartsCredentials, ConfigError, KeycloakSettings, RelayConfig, ServerSettings,
    SettingsFile, TokenSettings, WebSocketSettings,
};

// Autodarts integration
pub use infrastructure::autodarts::{
    AuthError, ConnectionState, Credential, KeycloakConfig, MatchRelay, RelayAction, RelayState,
    StreamClient, StreamClientConfig, StreamClientError, StreamEvent, StreamMessage, StreamStatus,
    TokenManager, TokenManagerHandle, TopicRequest,
};

// Round distribution
pub use infrastructure::broadcast::RoundHub;
pub use infrastructure::forward::{ForwardError, Forwarder};

// HTTP server
pub use infrastructure::http::{HttpServerError, RelayHttpServer, RelayServerState, router};

// Telemetry
pub use infrastructure::telemetry::init as init_telemetry;
