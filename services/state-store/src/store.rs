//! The `StateStore` trait and its read models

use crate::change_set::{ChangeSet, Publication, SymbolCounters};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::Order;
use types::trade::Trade;

/// Store failures. `Unavailable` is transient and eligible for retry;
/// everything else is permanent.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Unavailable(String),

    #[error("journal corrupted: {0}")]
    Corrupted(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether a bounded retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Capped exponential backoff for transient apply failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given retry attempt (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map(|d| d.min(self.max_delay))
            .unwrap_or(self.max_delay)
    }
}

/// One aggregated price level as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelView {
    pub price: Price,
    pub total_quantity: Quantity,
    pub order_count: u32,
}

/// Depth-limited book snapshot, consistent with `sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    /// Best bid first (descending price).
    pub bids: Vec<LevelView>,
    /// Best ask first (ascending price).
    pub asks: Vec<LevelView>,
    /// Last event sequence committed for this symbol.
    pub sequence: u64,
    pub timestamp: i64,
}

/// Full per-symbol state for booting a symbol worker.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolSnapshot {
    /// Live (resting and stop-held) order records.
    pub orders: Vec<Order>,
    /// FIFO id queues per bid level, no particular level order.
    pub bid_queues: Vec<(Price, Vec<OrderId>)>,
    /// FIFO id queues per ask level, no particular level order.
    pub ask_queues: Vec<(Price, Vec<OrderId>)>,
    /// Orders held in the stop table.
    pub stop_order_ids: Vec<OrderId>,
    pub counters: SymbolCounters,
}

/// Delivery half of the pub/sub plane.
///
/// The store hands every publication bound to a change-set to the attached
/// sink inside the same `apply` call, so state commit and event delivery
/// are one step: a command whose apply fails delivers nothing, and a
/// command whose apply succeeds has already delivered.
pub trait EventSink: Send + Sync {
    fn deliver(&self, publication: &Publication);
}

/// Key-addressable durable store consumed by the core.
///
/// `apply` is the only write path and must be atomic per change-set. Reads
/// observe only committed applies.
pub trait StateStore: Send + Sync {
    /// Atomically apply one command's change-set, delivering its
    /// publications to the attached sink.
    fn apply(&self, change: &ChangeSet) -> Result<(), StoreError>;

    /// Attach the sink that receives each apply's publications. Applies
    /// before a sink is attached (journal replay included) deliver
    /// nowhere; subscribers recover through the snapshot handoff.
    fn set_event_sink(&self, sink: Arc<dyn EventSink>);

    /// Load the full committed state of one symbol (engine boot / re-sync).
    fn load_symbol(&self, symbol: &Symbol) -> Result<SymbolSnapshot, StoreError>;

    /// Depth-limited consistent book snapshot.
    fn book_snapshot(&self, symbol: &Symbol, depth: usize) -> Result<BookSnapshot, StoreError>;

    /// Look up a single order record.
    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    /// All order records for a user, newest first.
    fn user_orders(&self, user_id: UserId) -> Result<Vec<Order>, StoreError>;

    /// Recent trades for a symbol, newest first.
    fn recent_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>, StoreError>;

    /// Next free global order id (max assigned + 1).
    fn next_order_id(&self) -> Result<u64, StoreError>;

    /// Flush any buffered writes (called on shutdown).
    fn sync(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_backoff_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
        };

        assert_eq!(policy.delay(0), Duration::from_millis(10));
        assert_eq!(policy.delay(1), Duration::from_millis(20));
        assert_eq!(policy.delay(2), Duration::from_millis(40));
        assert_eq!(policy.delay(4), Duration::from_millis(100));
        assert_eq!(policy.delay(30), Duration::from_millis(100));
    }

    #[test]
    fn test_store_error_transience() {
        assert!(StoreError::Unavailable("backend flapping".into()).is_transient());
        assert!(!StoreError::Corrupted("bad checksum".into()).is_transient());
    }
}
