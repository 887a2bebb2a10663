//! Match Relay State Machine
//!
//! Tracks the relay's position in the topic cascade and decides which
//! frames to send and which rounds to publish. The machine is fed typed
//! events and returns actions, decoupled from the transport so it can be
//! tested by replaying synthetic messages.
//!
//! # States
//!
//! ```text
//! Disconnected ──open──► Connected(no match) ──start──► Connected(match)
//!      ▲                        ▲                             │
//!      │                        └────────finish/delete────────┘
//!      └───────────────close/error────────────────────────────┘
//! ```
//!
//! Invariant: the match topic subscription exists if and only if a match
//! is active, and at most one match topic is subscribed at a time.

use crate::domain::round::Round;

use super::messages::{InboundEvent, StreamMessage, TopicRequest};

/// Connection-scoped relay state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RelayState {
    /// No transport connection.
    #[default]
    Disconnected,
    /// Transport open, board topic subscribed.
    Connected {
        /// Identifier of the currently subscribed match, if any.
        active_match: Option<String>,
    },
}

/// Side effect requested by the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayAction {
    /// Send a subscribe/unsubscribe frame on the transport.
    Send(TopicRequest),
    /// Publish a newly relayed round to the downstream sinks.
    Publish(Round),
}

/// Subscription state machine for one board.
///
/// Created per connection attempt; `on_close` resets it so a supervising
/// reconnect never resumes half-subscribed.
#[derive(Debug)]
pub struct MatchRelay {
    board_id: String,
    state: RelayState,
}

impl MatchRelay {
    /// Create a relay for the given board, starting disconnected.
    #[must_use]
    pub const fn new(board_id: String) -> Self {
        Self {
            board_id,
            state: RelayState::Disconnected,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &RelayState {
        &self.state
    }

    /// Identifier of the currently subscribed match, if any.
    #[must_use]
    pub fn active_match(&self) -> Option<&str> {
        match &self.state {
            RelayState::Connected {
                active_match: Some(id),
            } => Some(id),
            _ => None,
        }
    }

    /// Whether the transport is open.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        matches!(self.state, RelayState::Connected { .. })
    }

    /// Transport opened: subscribe the board-level topic.
    pub fn on_open(&mut self) -> Vec<RelayAction> {
        self.state = RelayState::Connected { active_match: None };
        vec![RelayAction::Send(TopicRequest::subscribe_board(
            &self.board_id,
        ))]
    }

    /// Transport closed or errored: reset, dropping any match subscription.
    pub fn on_close(&mut self) {
        self.state = RelayState::Disconnected;
    }

    /// Process one inbound message, returning the actions to perform.
    ///
    /// Malformed or out-of-order messages produce no actions.
    pub fn on_message(&mut self, msg: StreamMessage) -> Vec<RelayAction> {
        if !self.is_connected() {
            return Vec::new();
        }

        match InboundEvent::from(msg) {
            InboundEvent::MatchStarted { match_id } => self.handle_match_started(match_id),
            InboundEvent::MatchEnded { match_id } => self.handle_match_ended(&match_id),
            InboundEvent::MatchUpdate { topic, turns } => self.handle_match_update(topic, turns),
            InboundEvent::Ignored => Vec::new(),
        }
    }

    fn handle_match_started(&mut self, match_id: String) -> Vec<RelayAction> {
        let mut actions = Vec::new();

        match self.active_match() {
            Some(current) if current == match_id => return actions,
            Some(current) => {
                // A new match replaces the previous subscription.
                actions.push(RelayAction::Send(TopicRequest::unsubscribe_match(current)));
            }
            None => {}
        }

        actions.push(RelayAction::Send(TopicRequest::subscribe_match(&match_id)));
        self.state = RelayState::Connected {
            active_match: Some(match_id),
        };
        actions
    }

    fn handle_match_ended(&mut self, match_id: &str) -> Vec<RelayAction> {
        if self.active_match() != Some(match_id) {
            return Vec::new();
        }

        self.state = RelayState::Connected { active_match: None };
        vec![RelayAction::Send(TopicRequest::unsubscribe_match(match_id))]
    }

    fn handle_match_update(
        &mut self,
        topic: Option<String>,
        turns: Vec<Round>,
    ) -> Vec<RelayAction> {
        let Some(active) = self.active_match() else {
            // Stray update after the match ended, not authoritative.
            return Vec::new();
        };

        // When the topic is present it must name the active match.
        if let Some(topic) = &topic
            && *topic != format!("{active}.state")
        {
            return Vec::new();
        }

        turns
            .into_iter()
            .next()
            .map(RelayAction::Publish)
            .into_iter()
            .collect()
    }
}
