//! Relay Configuration Settings
//!
//! Configuration is resolved environment-first, falling back to the
//! controller's `settings.json` for the Autodarts credentials. Required
//! values fail fast at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::infrastructure::autodarts::auth::{
    DEFAULT_KEYCLOAK_URL, DEFAULT_REALM, DEFAULT_TICK, KeycloakConfig,
};
use crate::infrastructure::autodarts::reconnect::ReconnectConfig;
use crate::infrastructure::autodarts::stream::{DEFAULT_STREAM_URL, StreamClientConfig};

/// Default location of the display controller's settings file.
pub const DEFAULT_SETTINGS_FILE: &str = "/home/pi/rgbserver/settings.json";

/// Default base URL of the display controller receiving forwarded rounds.
pub const DEFAULT_FORWARD_URL: &str = "http://localhost:5000";

/// Autodarts account credentials.
#[derive(Clone)]
pub struct AutodartsCredentials {
    /// Account username.
    pub username: String,
    /// Account password.
    pub password: String,
    /// OAuth client id.
    pub client_id: String,
    /// Optional OAuth client secret.
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for AutodartsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutodartsCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port of the round/health HTTP server.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Token renewal settings.
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Interval between renewal checks.
    pub tick: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self { tick: DEFAULT_TICK }
    }
}

/// Identity provider location.
#[derive(Debug, Clone)]
pub struct KeycloakSettings {
    /// Base URL of the Keycloak server.
    pub base_url: String,
    /// Realm name.
    pub realm: String,
}

impl Default for KeycloakSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_KEYCLOAK_URL.to_string(),
            realm: DEFAULT_REALM.to_string(),
        }
    }
}

/// WebSocket reconnection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(64),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

impl From<&WebSocketSettings> for ReconnectConfig {
    fn from(settings: &WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1, // Default jitter
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Subset of the display controller's `settings.json` the relay reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsFile {
    /// Autodarts account username.
    #[serde(default)]
    pub autodarts_username: Option<String>,
    /// Autodarts account password.
    #[serde(default)]
    pub autodarts_password: Option<String>,
    /// OAuth client id.
    #[serde(default)]
    pub autodarts_client_id: Option<String>,
    /// OAuth client secret.
    #[serde(default)]
    pub autodarts_client_secret: Option<String>,
    /// Board identifier.
    #[serde(default)]
    pub autodarts_board_id: Option<String>,
}

impl SettingsFile {
    /// Load the settings file, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSettingsFile` when the file exists
    /// but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::InvalidSettingsFile(format!("{}: {e}", path.display())))?;
        let settings = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::InvalidSettingsFile(format!("{}: {e}", path.display())))?;
        Ok(Some(settings))
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Autodarts account credentials.
    pub credentials: AutodartsCredentials,
    /// Board whose matches are relayed.
    pub board_id: String,
    /// Identity provider location.
    pub keycloak: KeycloakSettings,
    /// Push-channel WebSocket URL.
    pub stream_url: String,
    /// Base URL of the display controller.
    pub forward_url: String,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Token renewal settings.
    pub token: TokenSettings,
    /// WebSocket reconnection settings.
    pub websocket: WebSocketSettings,
}

impl RelayConfig {
    /// Resolve configuration from environment variables, falling back to
    /// the settings file for credentials.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a required value is absent or the
    /// settings file is unreadable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("AUTODARTS_SETTINGS_FILE")
            .map_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE), PathBuf::from);
        let settings = SettingsFile::load(&path)?;
        Self::resolve(settings.as_ref(), |name| std::env::var(name).ok())
    }

    /// Resolve configuration from explicit sources. Environment values
    /// take precedence over the settings file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingSetting` when a required value is
    /// absent from both sources.
    pub fn resolve(
        settings: Option<&SettingsFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let credentials = AutodartsCredentials {
            username: require(
                "AUTODARTS_USERNAME",
                settings.and_then(|s| s.autodarts_username.clone()),
                &env,
            )?,
            password: require(
                "AUTODARTS_PASSWORD",
                settings.and_then(|s| s.autodarts_password.clone()),
                &env,
            )?,
            client_id: require(
                "AUTODARTS_CLIENT_ID",
                settings.and_then(|s| s.autodarts_client_id.clone()),
                &env,
            )?,
            client_secret: optional(
                "AUTODARTS_CLIENT_SECRET",
                settings.and_then(|s| s.autodarts_client_secret.clone()),
                &env,
            ),
        };

        let board_id = require(
            "AUTODARTS_BOARD_ID",
            settings.and_then(|s| s.autodarts_board_id.clone()),
            &env,
        )?;

        let keycloak = KeycloakSettings {
            base_url: env("AUTODARTS_KEYCLOAK_URL")
                .unwrap_or_else(|| KeycloakSettings::default().base_url),
            realm: env("AUTODARTS_REALM").unwrap_or_else(|| KeycloakSettings::default().realm),
        };

        let stream_url =
            env("AUTODARTS_STREAM_URL").unwrap_or_else(|| DEFAULT_STREAM_URL.to_string());

        let forward_url = env("WEBSERVER_URL").unwrap_or_else(|| DEFAULT_FORWARD_URL.to_string());

        let server = ServerSettings {
            http_port: parse_u16(&env, "PORT", ServerSettings::default().http_port),
        };

        let token = TokenSettings {
            tick: parse_duration_secs(&env, "AUTODARTS_TOKEN_TICK_SECS", TokenSettings::default().tick),
        };

        let websocket = WebSocketSettings {
            reconnect_delay_initial: parse_duration_millis(
                &env,
                "RELAY_RECONNECT_DELAY_INITIAL_MS",
                WebSocketSettings::default().reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &env,
                "RELAY_RECONNECT_DELAY_MAX_SECS",
                WebSocketSettings::default().reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_f64(
                &env,
                "RELAY_RECONNECT_DELAY_MULTIPLIER",
                WebSocketSettings::default().reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_u32(
                &env,
                "RELAY_MAX_RECONNECT_ATTEMPTS",
                WebSocketSettings::default().max_reconnect_attempts,
            ),
        };

        Ok(Self {
            credentials,
            board_id,
            keycloak,
            stream_url,
            forward_url,
            server,
            token,
            websocket,
        })
    }

    /// Build the identity provider configuration.
    #[must_use]
    pub fn keycloak_config(&self) -> KeycloakConfig {
        KeycloakConfig {
            base_url: self.keycloak.base_url.clone(),
            realm: self.keycloak.realm.clone(),
            client_id: self.credentials.client_id.clone(),
            client_secret: self.credentials.client_secret.clone(),
        }
    }

    /// Build the stream client configuration.
    #[must_use]
    pub fn stream_config(&self) -> StreamClientConfig {
        StreamClientConfig {
            url: self.stream_url.clone(),
            board_id: self.board_id.clone(),
            reconnect: ReconnectConfig::from(&self.websocket),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required setting is absent from both the environment and the
    /// settings file.
    #[error("missing setting: {0}")]
    MissingSetting(String),

    /// The settings file exists but could not be read or parsed.
    #[error("invalid settings file: {0}")]
    InvalidSettingsFile(String),
}

fn require(
    name: &str,
    file_value: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    optional(name, file_value, env).ok_or_else(|| ConfigError::MissingSetting(name.to_string()))
}

fn optional(
    name: &str,
    file_value: Option<String>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<String> {
    env(name)
        .filter(|v| !v.is_empty())
        .or_else(|| file_value.filter(|v| !v.is_empty()))
}

fn parse_u16(env: impl Fn(&str) -> Option<String>, key: &str, default: u16) -> u16 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_u32(env: impl Fn(&str) -> Option<String>, key: &str, default: u32) -> u32 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_f64(env: impl Fn(&str) -> Option<String>, key: &str, default: f64) -> f64 {
    env(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_duration_secs(
    env: impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    env(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    env: impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    env(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn env_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |name| map.get(name).map(|v| (*v).to_string())
    }

    fn full_env() -> Vec<(&'static str, &'static str)> {
        vec![
            ("AUTODARTS_USERNAME", "fabian"),
            ("AUTODARTS_PASSWORD", "hunter2"),
            ("AUTODARTS_CLIENT_ID", "relay"),
            ("AUTODARTS_BOARD_ID", "board-1"),
        ]
    }

    #[test]
    fn resolves_from_environment() {
        let config = RelayConfig::resolve(None, env_from(&full_env())).unwrap();
        assert_eq!(config.credentials.username, "fabian");
        assert_eq!(config.board_id, "board-1");
        assert!(config.credentials.client_secret.is_none());
        assert_eq!(config.forward_url, DEFAULT_FORWARD_URL);
        assert_eq!(config.stream_url, DEFAULT_STREAM_URL);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.token.tick, Duration::from_secs(3));
    }

    #[test]
    fn settings_file_fills_missing_values() {
        let settings = SettingsFile {
            autodarts_username: Some("from-file".to_string()),
            autodarts_password: Some("pw".to_string()),
            autodarts_client_id: Some("cli".to_string()),
            autodarts_client_secret: Some("secret".to_string()),
            autodarts_board_id: Some("b".to_string()),
        };
        let config = RelayConfig::resolve(Some(&settings), |_| None).unwrap();
        assert_eq!(config.credentials.username, "from-file");
        assert_eq!(config.credentials.client_secret.as_deref(), Some("secret"));
    }

    #[test]
    fn environment_wins_over_settings_file() {
        let settings = SettingsFile {
            autodarts_username: Some("from-file".to_string()),
            autodarts_password: Some("pw".to_string()),
            autodarts_client_id: Some("cli".to_string()),
            autodarts_board_id: Some("b".to_string()),
            ..SettingsFile::default()
        };
        let config = RelayConfig::resolve(
            Some(&settings),
            env_from(&[("AUTODARTS_USERNAME", "from-env")]),
        )
        .unwrap();
        assert_eq!(config.credentials.username, "from-env");
        assert_eq!(config.board_id, "b");
    }

    #[test]
    fn missing_required_value_fails() {
        let err = RelayConfig::resolve(None, |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSetting(name) if name == "AUTODARTS_USERNAME"));
    }

    #[test]
    fn empty_environment_value_counts_as_absent() {
        let mut env = full_env();
        env.push(("AUTODARTS_CLIENT_SECRET", ""));
        let config = RelayConfig::resolve(None, env_from(&env)).unwrap();
        assert!(config.credentials.client_secret.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut env = full_env();
        env.extend([
            ("PORT", "9000"),
            ("AUTODARTS_TOKEN_TICK_SECS", "1"),
            ("WEBSERVER_URL", "http://display.local"),
            ("RELAY_MAX_RECONNECT_ATTEMPTS", "5"),
        ]);
        let config = RelayConfig::resolve(None, env_from(&env)).unwrap();
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.token.tick, Duration::from_secs(1));
        assert_eq!(config.forward_url, "http://display.local");
        assert_eq!(config.websocket.max_reconnect_attempts, 5);
    }

    #[test]
    fn settings_file_loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"autodarts_username":"u","autodarts_board_id":"b","rows":64}}"#
        )
        .unwrap();

        let settings = SettingsFile::load(file.path()).unwrap().unwrap();
        assert_eq!(settings.autodarts_username.as_deref(), Some("u"));
        assert_eq!(settings.autodarts_board_id.as_deref(), Some("b"));
        assert!(settings.autodarts_password.is_none());
    }

    #[test]
    fn absent_settings_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let result = SettingsFile::load(&dir.path().join("nope.json")).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn corrupt_settings_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = SettingsFile::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSettingsFile(_)));
    }

    #[test]
    fn websocket_settings_convert_to_reconnect_config() {
        let settings = WebSocketSettings {
            reconnect_delay_initial: Duration::from_millis(250),
            reconnect_delay_max: Duration::from_secs(10),
            reconnect_delay_multiplier: 3.0,
            max_reconnect_attempts: 7,
        };
        let config = ReconnectConfig::from(&settings);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.max_attempts, 7);
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = AutodartsCredentials {
            username: "fabian".to_string(),
            password: "hunter2".to_string(),
            client_id: "relay".to_string(),
            client_secret: Some("s3cret".to_string()),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("fabian"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("s3cret"));
    }
}
