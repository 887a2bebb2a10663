//! Autodarts Integration
//!
//! Everything that talks to the Autodarts platform: the Keycloak
//! credential lifecycle, the push-channel wire types, the relay state
//! machine and the supervising WebSocket client.

/// Keycloak credential lifecycle management.
pub mod auth;

/// Push-channel wire format types.
pub mod messages;

/// Reconnection policy with exponential backoff.
pub mod reconnect;

/// Subscription cascade state machine.
pub mod relay;

/// WebSocket client for the push channel.
pub mod stream;

pub use auth::{AuthError, Credential, KeycloakConfig, TokenManager, TokenManagerHandle};
pub use messages::{StreamMessage, TopicRequest};
pub use relay::{MatchRelay, RelayAction, RelayState};
pub use stream::{
    ConnectionState, StreamClient, StreamClientConfig, StreamClientError, StreamEvent,
    StreamStatus,
};
