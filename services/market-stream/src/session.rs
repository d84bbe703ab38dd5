//! Client session wire protocol
//!
//! JSON messages exchanged with long-lived subscriber sessions. All numbers
//! travel as decimal strings. Unknown inbound types are answered with an
//! error message; they never close the session.

use crate::events::{EventEnvelope, EventPayload};
use serde::{Deserialize, Serialize};
use state_store::BookSnapshot;
use thiserror::Error;
use types::trade::Trade;

/// WebSocket close code sent on server shutdown.
pub const GOING_AWAY: u16 = 1001;

/// Inbound messages from a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    GetOrderBook { depth: Option<usize> },
    GetRecentTrades { limit: Option<usize> },
}

/// Outbound error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownMessage,
    SnapshotUnavailable,
    SubscriptionLagged,
}

/// Outbound messages to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Pong,
    OrderBookSnapshot { data: BookSnapshot },
    OrderUpdate { data: EventEnvelope },
    TradeExecution { data: EventEnvelope },
    BookChange { data: EventEnvelope },
    RecentTrades { data: Vec<Trade> },
    Error { kind: ErrorKind, message: String },
}

impl ServerMessage {
    /// Wrap a published event in its session message type.
    pub fn from_event(event: EventEnvelope) -> Self {
        match event.payload {
            EventPayload::OrderChanged { .. } => ServerMessage::OrderUpdate { data: event },
            EventPayload::TradeExecuted { .. } => ServerMessage::TradeExecution { data: event },
            EventPayload::BookChanged { .. } => ServerMessage::BookChange { data: event },
        }
    }
}

/// Session protocol failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown message type")]
    UnknownMessage,

    #[error("malformed message: {0}")]
    Malformed(String),
}

/// Parse one inbound frame.
///
/// Distinguishes unknown-but-well-formed messages (answered with
/// `Error{UnknownMessage}`) from frames that are not JSON objects at all.
pub fn parse_client_message(raw: &str) -> Result<ClientMessage, SessionError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| SessionError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(SessionError::Malformed("expected a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|_| SessionError::UnknownMessage)
}
