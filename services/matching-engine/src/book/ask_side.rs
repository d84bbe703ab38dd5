//! Ask (sell) side of the book
//!
//! Price levels in a `BTreeMap`, iterated lowest-price-first so the best
//! ask is always the front of iteration.

use state_store::LevelView;
use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;

/// Sell-side levels, best (lowest) price first.
#[derive(Debug, Clone, Default)]
pub struct AskSide {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskSide {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, price: Price, order_id: OrderId, sequence: u64, remaining: Quantity) {
        self.levels
            .entry(price)
            .or_insert_with(PriceLevel::new)
            .append(order_id, sequence, remaining);
    }

    /// Lowest ask price.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    pub fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next()
            .map(|(price, level)| (*price, level))
    }

    pub fn level(&self, price: Price) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub fn level_mut(&mut self, price: Price) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    /// Drop a level once empty.
    pub fn remove_level_if_empty(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(|l| l.is_empty()) {
            self.levels.remove(&price);
        }
    }

    /// Top `depth` levels with aggregates, best first.
    pub fn depth(&self, depth: usize) -> Vec<LevelView> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| LevelView {
                price: *price,
                total_quantity: level.total_quantity(),
                order_count: level.order_count(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Every level's aggregates match its queue, and no empty level exists.
    pub fn check_aggregates(&self) -> bool {
        self.levels
            .values()
            .all(|l| !l.is_empty() && l.check_aggregates())
    }
}
