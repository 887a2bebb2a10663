//! Keycloak Credential Lifecycle
//!
//! Obtains and continuously refreshes the access token used to read the
//! Autodarts push channel. The manager performs a resource-owner-password
//! grant at startup, resolves the subject id, and then keeps the
//! credential fresh from a background task on a fixed tick.
//!
//! # Renewal Policy (per tick)
//!
//! 1. No token held: perform a full grant.
//! 2. Access token stale, refresh token alive: exchange the refresh token.
//! 3. Refresh token stale too: perform a full grant with the original
//!    username and password.
//!
//! Any failure clears the held token and is retried on the next tick; the
//! loop never terminates because of a provider error.
//!
//! Expiry timestamps are computed as issue-time plus 0.9 of the
//! server-reported lifetime, so renewal always happens before the server
//! invalidates the token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Constants
// =============================================================================

/// Fraction of the server-reported lifetime after which a token counts
/// as stale, leaving slack for clock skew and request latency.
pub const TOKEN_LIFETIME_FRACTION: f64 = 0.9;

/// Default interval between renewal checks.
pub const DEFAULT_TICK: Duration = Duration::from_secs(3);

/// Default Keycloak base URL.
pub const DEFAULT_KEYCLOAK_URL: &str = "https://login.autodarts.io";

/// Default Keycloak realm.
pub const DEFAULT_REALM: &str = "autodarts";

/// Timeout for identity provider requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Type
// =============================================================================

/// Errors from the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The provider rejected the credentials or the refresh token.
    #[error("invalid credentials: the identity provider rejected the grant")]
    InvalidCredentials,

    /// The provider was unreachable or the request timed out.
    #[error("network error talking to the identity provider: {0}")]
    Network(String),

    /// The provider answered with a server-side error.
    #[error("identity provider server error (status {status})")]
    Server {
        /// HTTP status code returned by the provider.
        status: u16,
    },

    /// The provider response could not be parsed.
    #[error("malformed identity provider response: {0}")]
    MalformedResponse(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

// =============================================================================
// Keycloak Configuration
// =============================================================================

/// Connection parameters for the Keycloak identity provider.
#[derive(Clone)]
pub struct KeycloakConfig {
    /// Base URL of the Keycloak server.
    pub base_url: String,
    /// Realm name.
    pub realm: String,
    /// OAuth client id.
    pub client_id: String,
    /// Optional OAuth client secret.
    pub client_secret: Option<String>,
}

impl KeycloakConfig {
    /// Configuration for the production Autodarts login server.
    #[must_use]
    pub fn autodarts(client_id: String, client_secret: Option<String>) -> Self {
        Self {
            base_url: DEFAULT_KEYCLOAK_URL.to_string(),
            realm: DEFAULT_REALM.to_string(),
            client_id,
            client_secret,
        }
    }

    fn token_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }

    fn userinfo_url(&self) -> String {
        format!(
            "{}/realms/{}/protocol/openid-connect/userinfo",
            self.base_url.trim_end_matches('/'),
            self.realm
        )
    }
}

impl std::fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// =============================================================================
// Wire Types
// =============================================================================

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Short-lived bearer token.
    pub access_token: String,
    /// Longer-lived token used solely to obtain a new access token.
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: u64,
}

/// Userinfo endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Subject identifier of the authenticated user.
    pub sub: String,
}

// =============================================================================
// Credential
// =============================================================================

/// The complete authentication artifact set.
///
/// Replaced wholesale on every grant or refresh; readers always see
/// either the old or the new value, never a mix.
#[derive(Clone)]
pub struct Credential {
    /// Current access token.
    pub access_token: String,
    /// Current refresh token.
    pub refresh_token: String,
    /// When the access token counts as stale.
    pub expires_at: DateTime<Utc>,
    /// When the refresh token counts as stale.
    pub refresh_expires_at: DateTime<Utc>,
}

impl Credential {
    /// Build a credential from a token response issued at `issued_at`.
    #[must_use]
    pub fn from_response(token: &TokenResponse, issued_at: DateTime<Utc>) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: issued_at + scaled_lifetime(token.expires_in),
            refresh_expires_at: issued_at + scaled_lifetime(token.refresh_expires_in),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish()
    }
}

/// Scale a server-reported lifetime by [`TOKEN_LIFETIME_FRACTION`].
fn scaled_lifetime(seconds: u64) -> chrono::Duration {
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    chrono::Duration::seconds((TOKEN_LIFETIME_FRACTION * seconds as f64) as i64)
}

// =============================================================================
// Renewal Decision
// =============================================================================

/// What the renewal loop should do on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// The held token is still fresh.
    Keep,
    /// Exchange the refresh token for a new credential.
    Refresh,
    /// Re-authenticate with the original username and password.
    FullGrant,
}

/// Decide how to renew the credential at `now`.
#[must_use]
pub fn next_action(credential: Option<&Credential>, now: DateTime<Utc>) -> RefreshAction {
    let Some(cred) = credential else {
        return RefreshAction::FullGrant;
    };

    if now < cred.expires_at {
        RefreshAction::Keep
    } else if now < cred.refresh_expires_at {
        RefreshAction::Refresh
    } else {
        RefreshAction::FullGrant
    }
}

// =============================================================================
// Keycloak Client
// =============================================================================

/// Thin HTTP client for the Keycloak grant, refresh and userinfo endpoints.
#[derive(Debug, Clone)]
pub struct KeycloakClient {
    http: reqwest::Client,
    config: KeycloakConfig,
}

impl KeycloakClient {
    /// Create a client for the given provider configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Network` if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: KeycloakConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Network(e.to_string()))?;
        Ok(Self { http, config })
    }

    /// Perform a resource-owner-password grant.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] classifying the failure.
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, AuthError> {
        let mut params = vec![
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("username", username),
            ("password", password),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        self.token_request(&params).await
    }

    /// Exchange a refresh token for a new credential.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] classifying the failure.
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.as_str()));
        }
        self.token_request(&params).await
    }

    /// Resolve the subject identifier for an access token.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] classifying the failure.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserInfo, AuthError> {
        let response = self
            .http
            .get(self.config.userinfo_url())
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<UserInfo>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AuthError::InvalidCredentials),
            status => Err(AuthError::Server {
                status: status.as_u16(),
            }),
        }
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(self.config.token_url())
            .form(params)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<TokenResponse>().await?),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthError::InvalidCredentials)
            }
            status => Err(AuthError::Server {
                status: status.as_u16(),
            }),
        }
    }
}

// =============================================================================
// Token Manager
// =============================================================================

/// Keeps a valid access token available for the stream client.
///
/// The background task started by [`TokenManager::start`] is the sole
/// writer of the credential; it replaces the whole value atomically so
/// concurrent readers never observe a torn mix of old and new fields.
/// No lock is held across a network call.
pub struct TokenManager {
    client: KeycloakClient,
    username: String,
    password: String,
    tick: Duration,
    user_id: String,
    credential: RwLock<Option<Arc<Credential>>>,
}

impl TokenManager {
    /// Perform the initial grant and resolve the subject identifier.
    ///
    /// On failure no partially-initialized manager exists.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the grant or the userinfo lookup fails.
    pub async fn initialize(
        config: KeycloakConfig,
        username: impl Into<String>,
        password: impl Into<String>,
        tick: Duration,
    ) -> Result<Self, AuthError> {
        let client = KeycloakClient::new(config)?;
        let username = username.into();
        let password = password.into();

        let token = client.password_grant(&username, &password).await?;
        let credential = Credential::from_response(&token, Utc::now());
        let user_id = client.userinfo(&credential.access_token).await?.sub;

        tracing::info!(user_id = %user_id, "Authenticated against identity provider");

        Ok(Self {
            client,
            username,
            password,
            tick,
            user_id,
            credential: RwLock::new(Some(Arc::new(credential))),
        })
    }

    /// Subject identifier resolved at initialization.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Most recent access token, or `None` if the last renewal failed.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.credential
            .read()
            .as_ref()
            .map(|cred| cred.access_token.clone())
    }

    /// Snapshot of the full credential.
    #[must_use]
    pub fn current_credential(&self) -> Option<Arc<Credential>> {
        self.credential.read().clone()
    }

    /// Start the background renewal task.
    ///
    /// Returns a handle whose [`TokenManagerHandle::stop`] terminates the
    /// task within one tick interval and joins it.
    #[must_use]
    pub fn start(self: &Arc<Self>) -> TokenManagerHandle {
        let cancel = CancellationToken::new();
        let manager = Arc::clone(self);
        let loop_cancel = cancel.clone();
        let join = tokio::spawn(async move { manager.refresh_loop(loop_cancel).await });
        TokenManagerHandle { cancel, join }
    }

    async fn refresh_loop(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(tick = ?self.tick, "Token renewal loop started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.tick) => self.tick_once(Utc::now()).await,
            }
        }
        tracing::info!("Token renewal loop stopped");
    }

    /// Run one renewal check.
    pub async fn tick_once(&self, now: DateTime<Utc>) {
        let snapshot = self.current_credential();
        let action = next_action(snapshot.as_deref(), now);

        let result = match (action, snapshot) {
            (RefreshAction::Keep, _) => return,
            (RefreshAction::Refresh, Some(cred)) => {
                self.client.refresh_grant(&cred.refresh_token).await
            }
            (RefreshAction::Refresh, None) | (RefreshAction::FullGrant, _) => {
                self.client
                    .password_grant(&self.username, &self.password)
                    .await
            }
        };

        match result {
            Ok(token) => {
                let credential = Credential::from_response(&token, Utc::now());
                tracing::debug!(
                    expires_at = %credential.expires_at,
                    refresh_expires_at = %credential.refresh_expires_at,
                    "Credential renewed"
                );
                *self.credential.write() = Some(Arc::new(credential));
            }
            Err(error) => {
                // Drop the held token so the next tick retries from scratch.
                *self.credential.write() = None;
                tracing::warn!(error = %error, "Credential renewal failed");
            }
        }
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("tick", &self.tick)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Handle for the background renewal task.
#[derive(Debug)]
pub struct TokenManagerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl TokenManagerHandle {
    /// Signal the renewal task to exit and wait for it to terminate.
    ///
    /// Returns within one tick interval; no grant or refresh call happens
    /// afterwards.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn token_response(expires_in: u64, refresh_expires_in: u64) -> TokenResponse {
        TokenResponse {
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in,
            refresh_expires_in,
        }
    }

    #[test]
    fn expiry_uses_lifetime_fraction() {
        let issued = Utc::now();
        let cred = Credential::from_response(&token_response(100, 1000), issued);

        assert_eq!(cred.expires_at, issued + chrono::Duration::seconds(90));
        assert_eq!(
            cred.refresh_expires_at,
            issued + chrono::Duration::seconds(900)
        );
    }

    #[test]
    fn no_credential_forces_full_grant() {
        assert_eq!(next_action(None, Utc::now()), RefreshAction::FullGrant);
    }

    // Offsets are seconds relative to issue; lifetimes 100s/1000s scale
    // to 90s/900s staleness thresholds.
    #[test_case(0, RefreshAction::Keep; "fresh access token")]
    #[test_case(89, RefreshAction::Keep; "just before access expiry")]
    #[test_case(91, RefreshAction::Refresh; "access stale refresh alive")]
    #[test_case(899, RefreshAction::Refresh; "just before refresh expiry")]
    #[test_case(901, RefreshAction::FullGrant; "refresh stale too")]
    fn renewal_branches(offset_secs: i64, expected: RefreshAction) {
        let issued = Utc::now();
        let cred = Credential::from_response(&token_response(100, 1000), issued);
        let now = issued + chrono::Duration::seconds(offset_secs);
        assert_eq!(next_action(Some(&cred), now), expected);
    }

    #[test]
    fn credential_debug_redacts_tokens() {
        let token = TokenResponse {
            access_token: "tok-secret-a".to_string(),
            refresh_token: "tok-secret-r".to_string(),
            expires_in: 60,
            refresh_expires_in: 600,
        };
        let cred = Credential::from_response(&token, Utc::now());
        let debug = format!("{cred:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("tok-secret"));
    }

    #[test]
    fn keycloak_config_debug_redacts_secret() {
        let config = KeycloakConfig::autodarts("cli".to_string(), Some("s3cret".to_string()));
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn keycloak_urls() {
        let config = KeycloakConfig::autodarts("cli".to_string(), None);
        assert_eq!(
            config.token_url(),
            "https://login.autodarts.io/realms/autodarts/protocol/openid-connect/token"
        );
        assert_eq!(
            config.userinfo_url(),
            "https://login.autodarts.io/realms/autodarts/protocol/openid-connect/userinfo"
        );
    }
}
