//! Bid (buy) side of the book
//!
//! Price levels in a `BTreeMap`, iterated highest-price-first so the best
//! bid is always the front of iteration.

use state_store::LevelView;
use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;

/// Buy-side levels, best (highest) price first.
#[derive(Debug, Clone, Default)]
pub struct BidSide {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidSide {
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

    /// Highest bid price.
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    pub fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next_back()
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
            .rev()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    #[test]
    fn test_best_bid_is_highest() {
        let mut side = BidSide::new();
        side.insert(Price::from_units(50000), OrderId::new(1), 1, qty("1.0"));
        side.insert(Price::from_units(51000), OrderId::new(2), 2, qty("2.0"));
        side.insert(Price::from_units(49000), OrderId::new(3), 3, qty("1.5"));

        assert_eq!(side.best_price(), Some(Price::from_units(51000)));
    }

    #[test]
    fn test_depth_descending() {
        let mut side = BidSide::new();
        side.insert(Price::from_units(50000), OrderId::new(1), 1, qty("1.0"));
        side.insert(Price::from_units(51000), OrderId::new(2), 2, qty("2.0"));
        side.insert(Price::from_units(49000), OrderId::new(3), 3, qty("1.5"));
        side.insert(Price::from_units(52000), OrderId::new(4), 4, qty("0.5"));

        let depth = side.depth(2);
        assert_eq!(depth.len(), 2);
        assert_eq!(depth[0].price, Price::from_units(52000));
        assert_eq!(depth[1].price, Price::from_units(51000));
    }

    #[test]
    fn test_same_price_shares_level() {
        let mut side = BidSide::new();
        side.insert(Price::from_units(50000), OrderId::new(1), 1, qty("1.0"));
        side.insert(Price::from_units(50000), OrderId::new(2), 2, qty("2.0"));

        assert_eq!(side.level_count(), 1);
        let level = side.level(Price::from_units(50000)).unwrap();
        assert_eq!(level.total_quantity(), qty("3"));
        assert_eq!(level.head().unwrap().order_id, OrderId::new(1));
    }

    #[test]
    fn test_empty_level_removed() {
        let mut side = BidSide::new();
        let price = Price::from_units(50000);
        side.insert(price, OrderId::new(1), 1, qty("1.0"));

        side.level_mut(price).unwrap().remove(OrderId::new(1));
        side.remove_level_if_empty(price);

        assert!(side.is_empty());
        assert!(side.check_aggregates());
    }
}
