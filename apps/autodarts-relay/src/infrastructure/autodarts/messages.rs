//! Autodarts WebSocket Message Types
//!
//! Wire format types for the Autodarts push channel at
//! `wss://api.autodarts.io/ms/v0/subscribe`.
//!
//! # Outbound
//!
//! Subscriptions are requested per topic:
//! ```json
//! {"channel": "autodarts.boards", "type": "subscribe", "topic": "<board>.matches"}
//! {"channel": "autodarts.matches", "type": "subscribe", "topic": "<match>.state"}
//! ```
//!
//! # Inbound
//!
//! Every pushed message carries a channel, an optional topic and type, and
//! an opaque data object:
//! ```json
//! {"channel": "autodarts.boards", "topic": "<board>.matches", "data": {"event": "start", "id": "..."}}
//! {"channel": "autodarts.matches", "topic": "<match>.state", "data": {"turns": [ ... ]}}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::round::Round;

/// Channel carrying per-board match lifecycle events.
pub const BOARD_CHANNEL: &str = "autodarts.boards";

/// Channel carrying per-match state updates.
pub const MATCH_CHANNEL: &str = "autodarts.matches";

// =============================================================================
// Outbound Requests
// =============================================================================

/// A subscribe or unsubscribe request for one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRequest {
    /// Target channel.
    pub channel: String,

    /// Request type: `subscribe` or `unsubscribe`.
    #[serde(rename = "type")]
    pub kind: RequestKind,

    /// Topic key, e.g. `"<board>.matches"` or `"<match>.state"`.
    pub topic: String,
}

/// Kind of topic request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Start receiving messages for the topic.
    Subscribe,
    /// Stop receiving messages for the topic.
    Unsubscribe,
}

impl TopicRequest {
    /// Subscribe to the match stream of a board.
    #[must_use]
    pub fn subscribe_board(board_id: &str) -> Self {
        Self {
            channel: BOARD_CHANNEL.to_string(),
            kind: RequestKind::Subscribe,
            topic: format!("{board_id}.matches"),
        }
    }

    /// Subscribe to the state stream of a match.
    #[must_use]
    pub fn subscribe_match(match_id: &str) -> Self {
        Self {
            channel: MATCH_CHANNEL.to_string(),
            kind: RequestKind::Subscribe,
            topic: format!("{match_id}.state"),
        }
    }

    /// Unsubscribe from the state stream of a match.
    #[must_use]
    pub fn unsubscribe_match(match_id: &str) -> Self {
        Self {
            channel: MATCH_CHANNEL.to_string(),
            kind: RequestKind::Unsubscribe,
            topic: format!("{match_id}.state"),
        }
    }
}

// =============================================================================
// Inbound Messages
// =============================================================================

/// Envelope for every inbound message on the push channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamMessage {
    /// Source channel.
    #[serde(default)]
    pub channel: Option<String>,

    /// Topic the message was published on.
    #[serde(default)]
    pub topic: Option<String>,

    /// Message type, present on some board-channel events.
    #[serde(default, rename = "type")]
    pub kind: Option<String>,

    /// Envelope-level match id, used by the compact board-event shape.
    #[serde(default)]
    pub id: Option<String>,

    /// Opaque payload, interpreted per channel.
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Board-channel payload: match lifecycle events.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoardEventData {
    /// Event name, e.g. `start`, `finish` or `delete`.
    #[serde(default)]
    pub event: Option<String>,

    /// Match identifier the event refers to.
    #[serde(default)]
    pub id: Option<String>,
}

/// Match-channel payload: state snapshot with ordered turns.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MatchStateData {
    /// Turns, most recent first. Empty or absent on non-scoring updates.
    #[serde(default)]
    pub turns: Vec<Round>,
}

/// Classified inbound event, decoupled from the wire envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A match started on the subscribed board.
    MatchStarted {
        /// Identifier of the started match.
        match_id: String,
    },
    /// A match on the subscribed board ended or was deleted.
    MatchEnded {
        /// Identifier of the ended match.
        match_id: String,
    },
    /// A state update on the match channel.
    MatchUpdate {
        /// Topic the update was published on, when present.
        topic: Option<String>,
        /// Turns carried by the update, most recent first.
        turns: Vec<Round>,
    },
    /// Anything malformed or not relevant to the relay.
    Ignored,
}

impl From<StreamMessage> for InboundEvent {
    fn from(msg: StreamMessage) -> Self {
        match msg.channel.as_deref() {
            Some(BOARD_CHANNEL) => classify_board_event(&msg),
            Some(MATCH_CHANNEL) => {
                let state: MatchStateData =
                    serde_json::from_value(msg.data).unwrap_or_default();
                Self::MatchUpdate {
                    topic: msg.topic,
                    turns: state.turns,
                }
            }
            _ => Self::Ignored,
        }
    }
}

/// Classify a board-channel message.
///
/// The event name and match id may arrive either inside `data` or on the
/// envelope itself; both shapes are observed on the feed.
fn classify_board_event(msg: &StreamMessage) -> InboundEvent {
    let data: BoardEventData = serde_json::from_value(msg.data.clone()).unwrap_or_default();
    let event = data.event.as_deref().or(msg.kind.as_deref());

    // A lifecycle event without a match id is malformed and ignored.
    let id = data.id.or_else(|| msg.id.clone());

    match (event, id) {
        (Some("start"), Some(match_id)) => InboundEvent::MatchStarted { match_id },
        (Some("finish" | "delete"), Some(match_id)) => InboundEvent::MatchEnded { match_id },
        _ => InboundEvent::Ignored,
    }
}
