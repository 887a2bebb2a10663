//! Round Data Model
//!
//! A round is one scoring snapshot emitted by the match-tracking service.
//! The relay only ever keeps the most recent one; there is no history.
//!
//! # Wire Format (JSON)
//! ```json
//! {
//!   "player": "Fabian",
//!   "score": 501,
//!   "sets": 0,
//!   "legs": 1,
//!   "checkout": "T20 T19 D12"
//! }
//! ```
//!
//! The feed is not fully schema-validated upstream, so every field is
//! optional and unknown fields are carried through untouched for the
//! downstream consumers.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One scoring snapshot for the player currently at the oche.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// Player name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,

    /// Remaining score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,

    /// Sets won so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<i64>,

    /// Legs won so far.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legs: Option<i64>,

    /// Checkout suggestion, e.g. `"T20 T19 D12"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout: Option<String>,

    /// Fields the relay does not interpret but must pass through.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Cache holding the most recently relayed round.
///
/// Overwritten wholesale on every update and read concurrently by the
/// HTTP surface. `GET /round` serves `{}` until the first round arrives.
#[derive(Debug, Default)]
pub struct RoundStore {
    latest: RwLock<Option<Round>>,
}

impl RoundStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached round.
    pub fn publish(&self, round: Round) {
        *self.latest.write() = Some(round);
    }

    /// Get a snapshot of the latest round, if any was relayed yet.
    #[must_use]
    pub fn latest(&self) -> Option<Round> {
        self.latest.read().clone()
    }

    /// Render the latest round as JSON, `{}` if none yet.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.latest.read().as_ref().map_or_else(
            || serde_json::Value::Object(serde_json::Map::new()),
            |round| serde_json::to_value(round).unwrap_or_default(),
        )
    }
}
