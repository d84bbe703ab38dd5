//! Trade types
//!
//! Trades are append-only records produced by the matcher. The execution
//! price is always the maker's limit price at the moment of the match.

use crate::ids::{OrderId, Symbol, TradeId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An executed trade between a resting maker and an incoming taker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Monotone per symbol.
    pub id: TradeId,
    pub symbol: Symbol,

    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,

    pub price: Price,
    pub quantity: Quantity,

    /// Unix nanos, non-decreasing per symbol.
    pub executed_at: i64,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: TradeId,
        symbol: Symbol,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        price: Price,
        quantity: Quantity,
        executed_at: i64,
    ) -> Self {
        Self {
            id,
            symbol,
            buy_order_id,
            sell_order_id,
            maker_order_id,
            taker_order_id,
            price,
            quantity,
            executed_at,
        }
    }

    /// Side of the taker: Buy if the incoming order was the buyer.
    pub fn taker_side(&self) -> Side {
        if self.taker_order_id == self.buy_order_id {
            Side::Buy
        } else {
            Side::Sell
        }
    }

    /// Trade value (price × quantity).
    pub fn notional(&self) -> Decimal {
        self.price.as_decimal() * self.quantity.as_decimal()
    }
}
