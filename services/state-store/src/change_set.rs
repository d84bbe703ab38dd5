//! Atomic change-sets
//!
//! A [`ChangeSet`] is the complete durable effect of one Submit or Cancel
//! command: order-record writes, index updates, resting-queue mutations with
//! explicit aggregate deltas, trade-log appends, counter updates, and the
//! event publications tied to the apply.
//!
//! The typed operations map one-to-one onto the logical key layout:
//! order records per id, per-user and per-symbol order indexes, a sorted
//! level index per (symbol, side), a FIFO id list plus aggregates per
//! (symbol, side, price), a stop index per symbol, and an append-only trade
//! log per symbol.

use serde::{Deserialize, Serialize};
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};
use types::trade::Trade;

/// Per-symbol counters persisted with every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SymbolCounters {
    /// Next arrival sequence to assign to an order joining the book.
    pub next_order_sequence: u64,
    /// Next trade id for this symbol.
    pub next_trade_id: u64,
    /// Next event sequence for this symbol (events start at 1).
    pub next_event_sequence: u64,
    /// Last trade price in ticks, if any trade has executed.
    pub last_trade_price: Option<Price>,
}

/// One typed mutation inside a change-set.
///
/// Queue mutations carry explicit quantity deltas so the store can maintain
/// level aggregates without re-deriving them from order records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateOp {
    /// Write (or overwrite) the full order record.
    PutOrder(Order),

    /// Add the order id to the per-user and per-symbol indexes.
    IndexOrder { user_id: UserId, order_id: OrderId },

    /// Append a resting order at the tail of its level queue.
    InsertResting {
        side: Side,
        price: Price,
        order_id: OrderId,
        quantity: Quantity,
    },

    /// Reduce a resting order's contribution to its level (partial fill).
    ReduceResting {
        side: Side,
        price: Price,
        order_id: OrderId,
        quantity: Quantity,
    },

    /// Remove a resting order from its level (full fill or cancel).
    /// `quantity` is the remainder still counted in the level aggregate.
    RemoveResting {
        side: Side,
        price: Price,
        order_id: OrderId,
        quantity: Quantity,
    },

    /// Hold a stop order in the symbol's trigger index.
    IndexStop { order_id: OrderId },

    /// Release a stop order from the trigger index.
    RemoveStop { order_id: OrderId },

    /// Append to the symbol's trade log.
    AppendTrade(Trade),

    /// Persist the symbol's counters.
    SetCounters(SymbolCounters),
}

/// An event publication bound to the same atomic apply.
///
/// The store hands every publication to its attached `EventSink` inside
/// `apply`, after the ops commit; a failed apply delivers none of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    /// Wire channel, e.g. `trade_executions:BTC/USD`.
    pub channel: String,
    /// Self-describing JSON payload.
    pub payload: String,
}

/// The durable effect of a single command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub symbol: Symbol,
    pub ops: Vec<StateOp>,
    pub publications: Vec<Publication>,
}

impl ChangeSet {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            ops: Vec::new(),
            publications: Vec::new(),
        }
    }

    pub fn push(&mut self, op: StateOp) {
        self.ops.push(op);
    }

    pub fn publish(&mut self, channel: String, payload: String) {
        self.publications.push(Publication { channel, payload });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.publications.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::TradeId;

    #[test]
    fn test_change_set_accumulates_ops() {
        let mut change = ChangeSet::new(Symbol::new("BTC/USD"));
        assert!(change.is_empty());

        change.push(StateOp::IndexOrder {
            user_id: UserId::new(1),
            order_id: OrderId::new(10),
        });
        change.publish("order_updates:BTC/USD".into(), "{}".into());

        assert_eq!(change.ops.len(), 1);
        assert_eq!(change.publications.len(), 1);
        assert!(!change.is_empty());
    }

    #[test]
    fn test_change_set_serialization_roundtrip() {
        let mut change = ChangeSet::new(Symbol::new("BTC/USD"));
        change.push(StateOp::InsertResting {
            side: Side::Buy,
            price: Price::from_units(50000),
            order_id: OrderId::new(3),
            quantity: "1.5".parse().unwrap(),
        });
        change.push(StateOp::AppendTrade(Trade::new(
            TradeId::new(1),
            Symbol::new("BTC/USD"),
            OrderId::new(3),
            OrderId::new(4),
            OrderId::new(3),
            OrderId::new(4),
            Price::from_units(50000),
            "0.5".parse().unwrap(),
            1_708_123_456_789_000_000,
        )));
        change.push(StateOp::SetCounters(SymbolCounters {
            next_order_sequence: 5,
            next_trade_id: 2,
            next_event_sequence: 9,
            last_trade_price: Some(Price::from_units(50000)),
        }));

        let json = serde_json::to_string(&change).unwrap();
        let back: ChangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(change, back);
    }
}
