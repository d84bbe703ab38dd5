//! Order lifecycle types

use crate::ids::{OrderId, Symbol, UserId};
use crate::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    Buy,
    /// Sell order (ask)
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order execution type.
///
/// Market orders never rest. Limit orders rest on the book if not fully
/// filled on arrival. Stop orders are held off-book and convert to Market
/// once their trigger price is crossed by the last trade price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

/// Why an order was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InvalidQuantity,
    MissingPrice,
    UnknownSymbol,
    NoLiquidity,
    InternalError,
}

/// Order status.
///
/// Legal transitions:
/// - `Pending` → `PartiallyFilled` | `Filled` | `Cancelled` | `Rejected`
/// - `PartiallyFilled` → `PartiallyFilled` | `Filled` | `Cancelled`
///
/// `Filled`, `Cancelled`, and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum OrderStatus {
    #[serde(rename = "PENDING")]
    Pending,

    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,

    #[serde(rename = "FILLED")]
    Filled,

    #[serde(rename = "CANCELLED")]
    Cancelled,

    #[serde(rename = "REJECTED")]
    Rejected(RejectReason),
}

impl OrderStatus {
    /// Check if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected(_)
        )
    }

    /// Check whether a transition to `next` is legal.
    pub fn can_transition(&self, next: &OrderStatus) -> bool {
        match self {
            OrderStatus::Pending => !matches!(next, OrderStatus::Pending),
            OrderStatus::PartiallyFilled => matches!(
                next,
                OrderStatus::PartiallyFilled | OrderStatus::Filled | OrderStatus::Cancelled
            ),
            _ => false,
        }
    }
}

/// A submitted order.
///
/// `sequence` is the per-symbol arrival number, assigned when the order
/// first becomes known to the book; it breaks ties inside a price level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub status: OrderStatus,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
    pub sequence: u64,
}

impl Order {
    /// Create a new pending order.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        order_type: OrderType,
        quantity: Quantity,
        price: Option<Price>,
        stop_price: Option<Price>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            symbol,
            side,
            order_type,
            quantity,
            filled_quantity: Quantity::zero(),
            price,
            stop_price,
            status: OrderStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
            sequence: 0,
        }
    }

    /// Quantity still open.
    pub fn remaining(&self) -> Quantity {
        self.quantity - self.filled_quantity
    }

    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Check the quantity invariant: `0 ≤ filled ≤ total` with status
    /// consistent with the fill level.
    pub fn check_invariant(&self) -> bool {
        if self.filled_quantity > self.quantity {
            return false;
        }
        match self.status {
            OrderStatus::Filled => self.is_filled(),
            OrderStatus::PartiallyFilled => self.has_fills() && !self.is_filled(),
            _ => true,
        }
    }

    /// Record a fill and advance the status.
    ///
    /// # Panics
    /// Panics if the fill would exceed the order quantity. The matcher
    /// always fills `min(taker remaining, maker remaining)`, so an overfill
    /// here is a logic error, not an input error.
    pub fn add_fill(&mut self, quantity: Quantity, timestamp: i64) {
        let new_filled = self.filled_quantity + quantity;
        assert!(
            new_filled <= self.quantity,
            "fill would exceed order quantity"
        );

        self.filled_quantity = new_filled;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = timestamp;
    }

    /// Cancel the order.
    ///
    /// # Panics
    /// Panics if the order is already terminal; callers check first.
    pub fn cancel(&mut self, timestamp: i64) {
        assert!(!self.status.is_terminal(), "cannot cancel terminal order");
        self.status = OrderStatus::Cancelled;
        self.updated_at = timestamp;
    }

    /// Reject the order terminally.
    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) {
        self.status = OrderStatus::Rejected(reason);
        self.updated_at = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order(side: Side, order_type: OrderType, qty: &str, price: Option<&str>) -> Order {
        Order::new(
            OrderId::new(1),
            UserId::new(7),
            Symbol::new("BTC/USD"),
            side,
            order_type,
            qty.parse().unwrap(),
            price.map(|p| p.parse().unwrap()),
            None,
            1_708_123_456_789_000_000,
        )
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_order_creation() {
        let order = sample_order(Side::Buy, OrderType::Limit, "1.0", Some("50000"));

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.remaining(), "1.0".parse().unwrap());
        assert!(order.check_invariant());
        assert!(!order.has_fills());
    }

    #[test]
    fn test_order_fill_transitions() {
        let mut order = sample_order(Side::Buy, OrderType::Limit, "1.0", Some("50000"));

        order.add_fill("0.3".parse().unwrap(), 1_708_123_456_790_000_000);
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.remaining(), "0.7".parse().unwrap());
        assert!(order.check_invariant());

        order.add_fill("0.7".parse().unwrap(), 1_708_123_456_791_000_000);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.is_filled());
        assert!(order.status.is_terminal());
        assert!(order.check_invariant());
    }

    #[test]
    #[should_panic(expected = "fill would exceed order quantity")]
    fn test_order_overfill_panics() {
        let mut order = sample_order(Side::Buy, OrderType::Limit, "1.0", Some("50000"));
        order.add_fill("1.5".parse().unwrap(), 1_708_123_456_790_000_000);
    }

    #[test]
    fn test_order_cancel() {
        let mut order = sample_order(Side::Buy, OrderType::Limit, "1.0", Some("50000"));

        order.cancel(1_708_123_456_790_000_000);
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(order.status.is_terminal());
    }

    #[test]
    #[should_panic(expected = "cannot cancel terminal order")]
    fn test_cancel_terminal_panics() {
        let mut order = sample_order(Side::Buy, OrderType::Limit, "1.0", Some("50000"));
        order.add_fill("1.0".parse().unwrap(), 1_708_123_456_790_000_000);
        order.cancel(1_708_123_456_791_000_000);
    }

    #[test]
    fn test_order_reject() {
        let mut order = sample_order(Side::Buy, OrderType::Market, "1.0", None);

        order.reject(RejectReason::NoLiquidity, 1_708_123_456_790_000_000);
        assert_eq!(order.status, OrderStatus::Rejected(RejectReason::NoLiquidity));
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_status_transition_rules() {
        let pending = OrderStatus::Pending;
        let partial = OrderStatus::PartiallyFilled;
        let filled = OrderStatus::Filled;
        let cancelled = OrderStatus::Cancelled;

        assert!(pending.can_transition(&partial));
        assert!(pending.can_transition(&filled));
        assert!(pending.can_transition(&cancelled));
        assert!(partial.can_transition(&partial));
        assert!(partial.can_transition(&filled));
        assert!(partial.can_transition(&cancelled));

        assert!(!filled.can_transition(&cancelled));
        assert!(!cancelled.can_transition(&pending));
        assert!(!partial.can_transition(&OrderStatus::Rejected(RejectReason::NoLiquidity)));
    }

    #[test]
    fn test_order_serialization_roundtrip() {
        let order = sample_order(Side::Sell, OrderType::Limit, "2.5", Some("3000.5"));

        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&OrderStatus::Rejected(RejectReason::NoLiquidity))
            .unwrap();
        assert_eq!(json, r#"{"state":"REJECTED","reason":"NO_LIQUIDITY"}"#);
    }
}
