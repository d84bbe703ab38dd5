//! Event envelopes published by the symbol workers
//!
//! Every event carries the symbol, a per-symbol monotone sequence number,
//! and a timestamp. Delivery is at-least-once; consumers deduplicate by
//! `(symbol, sequence)`. Ordering is by sequence.

use serde::{Deserialize, Serialize};
use types::ids::{OrderId, Symbol, TradeId, UserId};
use types::numeric::{Price, Quantity};
use types::order::{OrderStatus, OrderType, Side};
use uuid::Uuid;

/// One aggregated level touched by a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDelta {
    pub side: Side,
    pub price: Price,
    /// Zero when the level was emptied and removed.
    pub total_quantity: Quantity,
    pub order_count: u32,
}

/// Event-specific payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    /// An order transitioned state (accepted, filled, cancelled, rejected).
    OrderChanged {
        order_id: OrderId,
        user_id: UserId,
        side: Side,
        order_type: OrderType,
        status: OrderStatus,
        quantity: Quantity,
        filled_quantity: Quantity,
        price: Option<Price>,
        stop_price: Option<Price>,
    },

    /// A trade executed between a resting maker and an incoming taker.
    TradeExecuted {
        trade_id: TradeId,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        price: Price,
        quantity: Quantity,
    },

    /// Aggregated levels changed by one command.
    BookChanged { levels: Vec<LevelDelta> },
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUID v7) for tracing.
    pub event_id: Uuid,
    pub symbol: Symbol,
    /// Per-symbol monotone sequence: strictly increasing, contiguous,
    /// starting at 1. Shared across all payload kinds.
    pub sequence: u64,
    /// Unix nanos.
    pub timestamp: i64,
    pub payload: EventPayload,
}

impl EventEnvelope {
    pub fn new(symbol: Symbol, sequence: u64, timestamp: i64, payload: EventPayload) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            symbol,
            sequence,
            timestamp,
            payload,
        }
    }

    /// Wire channel this event publishes on.
    pub fn channel(&self) -> String {
        let topic = match &self.payload {
            EventPayload::OrderChanged { .. } => "order_updates",
            EventPayload::TradeExecuted { .. } => "trade_executions",
            EventPayload::BookChanged { .. } => "book_changes",
        };
        format!("{}:{}", topic, self.symbol)
    }

    /// Payload kind label for logging.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            EventPayload::OrderChanged { .. } => "OrderChanged",
            EventPayload::TradeExecuted { .. } => "TradeExecuted",
            EventPayload::BookChanged { .. } => "BookChanged",
        }
    }
}

impl Eq for EventEnvelope {}

impl Ord for EventEnvelope {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for EventEnvelope {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn book_changed(sequence: u64) -> EventEnvelope {
        EventEnvelope::new(
            Symbol::new("BTC/USD"),
            sequence,
            1_708_123_456_789_000_000 + sequence as i64,
            EventPayload::BookChanged {
                levels: vec![LevelDelta {
                    side: Side::Buy,
                    price: Price::from_units(50000),
                    total_quantity: "1.0".parse().unwrap(),
                    order_count: 1,
                }],
            },
        )
    }

    #[test]
    fn test_ordering_by_sequence() {
        let mut events = vec![book_changed(3), book_changed(1), book_changed(2)];
        events.sort();
        let sequences: Vec<u64> = events.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(book_changed(1).channel(), "book_changes:BTC/USD");

        let trade = EventEnvelope::new(
            Symbol::new("BTC/USD"),
            2,
            0,
            EventPayload::TradeExecuted {
                trade_id: TradeId::new(1),
                buy_order_id: OrderId::new(1),
                sell_order_id: OrderId::new(2),
                maker_order_id: OrderId::new(1),
                taker_order_id: OrderId::new(2),
                price: Price::from_units(50000),
                quantity: "0.5".parse().unwrap(),
            },
        );
        assert_eq!(trade.channel(), "trade_executions:BTC/USD");
        assert_eq!(trade.kind(), "TradeExecuted");
    }

    #[test]
    fn test_envelope_serialization_roundtrip() {
        let event = book_changed(42);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"BookChanged\""));

        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
