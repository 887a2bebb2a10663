//! Configuration Module
//!
//! Configuration loading for the relay service.

mod settings;

pub use settings::{
    AutodartsCredentials, ConfigError, DEFAULT_FORWARD_URL, DEFAULT_SETTINGS_FILE, KeycloakSettings,
    RelayConfig, ServerSettings, SettingsFile, TokenSettings, WebSocketSettings,
};
