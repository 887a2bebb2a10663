//! Round Broadcast Channel
//!
//! Fan-out of relayed rounds to real-time listeners using a tokio
//! broadcast channel. Each WebSocket push connection holds its own
//! receiver; senders never block on slow consumers.

use tokio::sync::broadcast;

use crate::domain::round::Round;

/// Default capacity of the round channel. Rounds arrive at human throwing
/// speed, so a small buffer is plenty.
const DEFAULT_CAPACITY: usize = 64;

/// Hub distributing relayed rounds to any number of live listeners.
#[derive(Debug)]
pub struct RoundHub {
    tx: broadcast::Sender<Round>,
}

impl RoundHub {
    /// Create a hub with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            tx: broadcast::channel(capacity).0,
        }
    }

    /// Create a hub with the default capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }

    /// Send a round to all subscribers.
    ///
    /// Returns the number of receivers that got the message, or `None`
    /// if nobody is listening.
    #[must_use]
    pub fn send_round(&self, round: Round) -> Option<usize> {
        self.tx.send(round).ok()
    }

    /// Get a new receiver for relayed rounds.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Round> {
        self.tx.subscribe()
    }

    /// Number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for RoundHub {
    fn default() -> Self {
        Self::with_defaults()
    }
}
