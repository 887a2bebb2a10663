//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains everything that touches the network or the
//! process environment.

/// Autodarts adapters (Keycloak auth, push-channel client, relay).
pub mod autodarts;

/// Broadcast channel for round distribution.
pub mod broadcast;

/// Configuration loading.
pub mod config;

/// Best-effort forwarding to the display controller.
pub mod forward;

/// Round and health HTTP endpoints.
pub mod http;

/// Tracing setup.
pub mod telemetry;
