//! Stop order table
//!
//! Stop orders are held off-book, indexed by side and trigger price. After
//! every trade the table is scanned against the last trade price: Buy-stops
//! fire when last ≥ trigger, Sell-stops when last ≤ trigger. Triggered
//! orders are drained in arrival-sequence order for determinism.

use std::collections::BTreeMap;
use types::errors::CancelError;
use types::ids::{OrderId, UserId};
use types::numeric::Price;
use types::order::{Order, Side};

/// Side-indexed stop table keyed by trigger price.
#[derive(Debug, Clone, Default)]
pub struct StopBook {
    buy_stops: BTreeMap<Price, Vec<Order>>,
    sell_stops: BTreeMap<Price, Vec<Order>>,
}

impl StopBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold a stop order until its trigger crosses.
    ///
    /// # Panics
    /// Panics if the order has no stop price; validation guarantees it.
    pub fn insert(&mut self, order: Order) {
        let trigger = order.stop_price.expect("stop order without trigger price");
        let table = match order.side {
            Side::Buy => &mut self.buy_stops,
            Side::Sell => &mut self.sell_stops,
        };
        table.entry(trigger).or_default().push(order);
    }

    /// Whether `last` crosses the trigger for a stop on `side`.
    pub fn crosses(side: Side, trigger: Price, last: Price) -> bool {
        match side {
            Side::Buy => last >= trigger,
            Side::Sell => last <= trigger,
        }
    }

    /// Drain every stop whose trigger is crossed by the last trade price,
    /// in arrival-sequence order.
    pub fn take_triggered(&mut self, last: Price) -> Vec<Order> {
        let mut triggered = Vec::new();

        let buy_prices: Vec<Price> = self
            .buy_stops
            .range(..=last)
            .map(|(price, _)| *price)
            .collect();
        for price in buy_prices {
            if let Some(orders) = self.buy_stops.remove(&price) {
                triggered.extend(orders);
            }
        }

        let sell_prices: Vec<Price> = self
            .sell_stops
            .range(last..)
            .map(|(price, _)| *price)
            .collect();
        for price in sell_prices {
            if let Some(orders) = self.sell_stops.remove(&price) {
                triggered.extend(orders);
            }
        }

        triggered.sort_by_key(|o| o.sequence);
        triggered
    }

    /// Remove a held stop for cancellation, enforcing ownership.
    pub fn remove(&mut self, order_id: OrderId, user_id: UserId) -> Result<Order, CancelError> {
        for table in [&mut self.buy_stops, &mut self.sell_stops] {
            let mut hit: Option<Price> = None;
            for (price, orders) in table.iter() {
                if orders.iter().any(|o| o.id == order_id) {
                    hit = Some(*price);
                    break;
                }
            }
            if let Some(price) = hit {
                let orders = table.get_mut(&price).ok_or(CancelError::NotFound(order_id))?;
                let position = orders
                    .iter()
                    .position(|o| o.id == order_id)
                    .ok_or(CancelError::NotFound(order_id))?;
                if orders[position].user_id != user_id {
                    return Err(CancelError::NotOwned(order_id));
                }
                let order = orders.remove(position);
                if orders.is_empty() {
                    table.remove(&price);
                }
                return Ok(order);
            }
        }
        Err(CancelError::NotFound(order_id))
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.buy_stops
            .values()
            .chain(self.sell_stops.values())
            .any(|orders| orders.iter().any(|o| o.id == order_id))
    }

    pub fn len(&self) -> usize {
        self.buy_stops
            .values()
            .chain(self.sell_stops.values())
            .map(|orders| orders.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buy_stops.is_empty() && self.sell_stops.is_empty()
    }
}
