//! Per-symbol order book
//!
//! Both book sides plus the order index (id → live resting record). The
//! index gives cancel-by-id its preconditions: `NotFound` for unknown ids,
//! `NotOwned` on user mismatch. Terminal orders never appear here: the
//! store keeps their records, the book only tracks live liquidity.

use state_store::{LevelView, SymbolSnapshot};
use std::collections::HashMap;
use types::errors::{CancelError, CoreError};
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};

use super::ask_side::AskSide;
use super::bid_side::BidSide;

/// Result of filling the maker at the head of a best level.
#[derive(Debug, Clone)]
pub struct MakerFill {
    /// Maker record after the fill.
    pub maker: Order,
    /// Execution price (the maker's level).
    pub price: Price,
    /// Whether the maker was fully filled and popped.
    pub maker_removed: bool,
    /// Level aggregate after the fill (zeroed when the level emptied).
    pub level: LevelView,
}

/// Two-sided limit order book for one symbol.
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BidSide,
    asks: AskSide,
    /// Live resting orders by id.
    orders: HashMap<OrderId, Order>,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BidSide::new(),
            asks: AskSide::new(),
            orders: HashMap::new(),
        }
    }

    /// Rebuild a book from committed store state, preserving FIFO order.
    pub fn restore(symbol: Symbol, snapshot: &SymbolSnapshot) -> Self {
        let mut book = Self::new(symbol);
        let records: HashMap<OrderId, &Order> =
            snapshot.orders.iter().map(|o| (o.id, o)).collect();

        let mut load = |queues: &[(Price, Vec<OrderId>)], side: Side| {
            for (price, queue) in queues {
                for order_id in queue {
                    if let Some(order) = records.get(order_id) {
                        match side {
                            Side::Buy => book.bids.insert(
                                *price,
                                *order_id,
                                order.sequence,
                                order.remaining(),
                            ),
                            Side::Sell => book.asks.insert(
                                *price,
                                *order_id,
                                order.sequence,
                                order.remaining(),
                            ),
                        }
                        book.orders.insert(*order_id, (*order).clone());
                    }
                }
            }
        };
        load(&snapshot.bid_queues, Side::Buy);
        load(&snapshot.ask_queues, Side::Sell);
        book
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Best price on the given side.
    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::Buy => self.best_bid(),
            Side::Sell => self.best_ask(),
        }
    }

    /// Head maker of the best level on the given side.
    pub fn head_of_best(&self, side: Side) -> Option<(Price, OrderId, Quantity)> {
        let price = self.best_price(side)?;
        let level = match side {
            Side::Buy => self.bids.level(price),
            Side::Sell => self.asks.level(price),
        }?;
        level
            .head()
            .map(|entry| (price, entry.order_id, entry.remaining))
    }

    /// Look up a live resting order.
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Rest a limit order at the tail of its level.
    ///
    /// Returns the level aggregate after insertion.
    pub fn insert_resting(&mut self, order: Order) -> Result<LevelView, CoreError> {
        let price = order.price.ok_or_else(|| {
            CoreError::InvariantViolation("resting order without a price".into())
        })?;

        match order.side {
            Side::Buy => self.bids.insert(price, order.id, order.sequence, order.remaining()),
            Side::Sell => self.asks.insert(price, order.id, order.sequence, order.remaining()),
        }
        self.orders.insert(order.id, order.clone());

        Ok(self.level_view(order.side, price))
    }

    /// Fill `quantity` against the maker at the head of the best level on
    /// `side`. The caller computed `quantity ≤ maker remaining`.
    pub fn fill_best_maker(
        &mut self,
        side: Side,
        quantity: Quantity,
        timestamp: i64,
    ) -> Result<MakerFill, CoreError> {
        let (price, maker_id, maker_remaining) = self.head_of_best(side).ok_or_else(|| {
            CoreError::InvariantViolation("fill requested against an empty side".into())
        })?;

        let maker = self.orders.get_mut(&maker_id).ok_or_else(|| {
            CoreError::InvariantViolation(format!("maker {maker_id} missing from index"))
        })?;
        maker.add_fill(quantity, timestamp);
        let maker = maker.clone();

        let maker_removed = quantity == maker_remaining;
        {
            let level = match side {
                Side::Buy => self.bids.level_mut(price),
                Side::Sell => self.asks.level_mut(price),
            }
            .ok_or_else(|| {
                CoreError::InvariantViolation(format!("level {price} vanished mid-fill"))
            })?;

            if maker_removed {
                level.pop_head();
            } else {
                level.reduce_head(quantity);
            }
        }

        if maker_removed {
            self.orders.remove(&maker_id);
            match side {
                Side::Buy => self.bids.remove_level_if_empty(price),
                Side::Sell => self.asks.remove_level_if_empty(price),
            }
        }

        Ok(MakerFill {
            maker,
            price,
            maker_removed,
            level: self.level_view(side, price),
        })
    }

    /// Remove a resting order for cancellation, enforcing ownership.
    ///
    /// Returns the removed record (status untouched) and the level
    /// aggregate after removal.
    pub fn remove_resting(
        &mut self,
        order_id: OrderId,
        user_id: UserId,
    ) -> Result<(Order, LevelView), CancelError> {
        let order = self
            .orders
            .get(&order_id)
            .ok_or(CancelError::NotFound(order_id))?;
        if order.user_id != user_id {
            return Err(CancelError::NotOwned(order_id));
        }

        let order = self
            .orders
            .remove(&order_id)
            .ok_or(CancelError::NotFound(order_id))?;
        let price = order.price.ok_or(CancelError::NotFound(order_id))?;

        match order.side {
            Side::Buy => {
                if let Some(level) = self.bids.level_mut(price) {
                    level.remove(order_id);
                }
                self.bids.remove_level_if_empty(price);
            }
            Side::Sell => {
                if let Some(level) = self.asks.level_mut(price) {
                    level.remove(order_id);
                }
                self.asks.remove_level_if_empty(price);
            }
        }

        let level = self.level_view(order.side, price);
        Ok((order, level))
    }

    /// Current aggregate for a level, zeroed once the level is gone.
    pub fn level_view(&self, side: Side, price: Price) -> LevelView {
        let level = match side {
            Side::Buy => self.bids.level(price),
            Side::Sell => self.asks.level(price),
        };
        match level {
            Some(level) => LevelView {
                price,
                total_quantity: level.total_quantity(),
                order_count: level.order_count(),
            },
            None => LevelView {
                price,
                total_quantity: Quantity::zero(),
                order_count: 0,
            },
        }
    }

    /// Depth-limited view of both sides, best first.
    pub fn snapshot(&self, depth: usize) -> (Vec<LevelView>, Vec<LevelView>) {
        (self.bids.depth(depth), self.asks.depth(depth))
    }

    /// A crossed book (best bid ≥ best ask) means the matcher failed.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }

    /// Consistency: aggregates match queues, no empty levels, every queued
    /// id has a record and vice versa.
    pub fn check_aggregates(&self) -> bool {
        self.bids.check_aggregates() && self.asks.check_aggregates()
    }

    /// Sum of remaining quantity resting on both sides.
    pub fn total_resting(&self) -> Quantity {
        self.orders
            .values()
            .fold(Quantity::zero(), |acc, o| acc + o.remaining())
    }
}
