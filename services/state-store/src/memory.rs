//! In-memory state store
//!
//! Authoritative store for a single process. One mutex guards the whole
//! state, which makes every apply trivially all-or-nothing; contention is
//! acceptable because each symbol has exactly one writer.

use crate::change_set::{ChangeSet, StateOp, SymbolCounters};
use crate::store::{
    BookSnapshot, EventSink, LevelView, StateStore, StoreError, SymbolSnapshot,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use types::clock;
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};
use types::trade::Trade;

#[derive(Debug, Default)]
struct LevelRecord {
    queue: VecDeque<OrderId>,
    total_quantity: Quantity,
    order_count: u32,
}

#[derive(Debug, Default)]
struct SymbolState {
    bids: BTreeMap<Price, LevelRecord>,
    asks: BTreeMap<Price, LevelRecord>,
    stops: BTreeSet<OrderId>,
    trades: Vec<Trade>,
    counters: SymbolCounters,
}

impl SymbolState {
    fn side_levels(&mut self, side: Side) -> &mut BTreeMap<Price, LevelRecord> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    symbols: HashMap<String, SymbolState>,
    orders: HashMap<OrderId, Order>,
    user_orders: HashMap<UserId, BTreeSet<OrderId>>,
    max_order_id: u64,
}

/// In-memory `StateStore` implementation.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    sink: RwLock<Option<Arc<dyn EventSink>>>,
    /// Pending injected transient failures (used by retry tests).
    fail_next: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sink: RwLock::new(None),
            fail_next: AtomicU32::new(0),
        }
    }

    /// Make the next `n` applies fail with a transient error.
    pub fn fail_next_applies(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_op(inner: &mut Inner, symbol_key: &str, op: &StateOp) {
    match op {
        StateOp::PutOrder(order) => {
            inner.max_order_id = inner.max_order_id.max(order.id.value());
            inner.orders.insert(order.id, order.clone());
        }
        StateOp::IndexOrder { user_id, order_id } => {
            inner.user_orders.entry(*user_id).or_default().insert(*order_id);
        }
        StateOp::InsertResting {
            side,
            price,
            order_id,
            quantity,
        } => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            let level = state.side_levels(*side).entry(*price).or_default();
            level.queue.push_back(*order_id);
            level.total_quantity = level.total_quantity + *quantity;
            level.order_count += 1;
        }
        StateOp::ReduceResting {
            side,
            price,
            quantity,
            ..
        } => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            if let Some(level) = state.side_levels(*side).get_mut(price) {
                level.total_quantity = level.total_quantity.saturating_sub(*quantity);
            }
        }
        StateOp::RemoveResting {
            side,
            price,
            order_id,
            quantity,
        } => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            let levels = state.side_levels(*side);
            if let Some(level) = levels.get_mut(price) {
                if let Some(pos) = level.queue.iter().position(|id| id == order_id) {
                    level.queue.remove(pos);
                    level.total_quantity = level.total_quantity.saturating_sub(*quantity);
                    level.order_count = level.order_count.saturating_sub(1);
                }
                if level.order_count == 0 {
                    levels.remove(price);
                }
            }
        }
        StateOp::IndexStop { order_id } => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            state.stops.insert(*order_id);
        }
        StateOp::RemoveStop { order_id } => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            state.stops.remove(order_id);
        }
        StateOp::AppendTrade(trade) => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            state.trades.push(trade.clone());
        }
        StateOp::SetCounters(counters) => {
            let state = inner.symbols.entry(symbol_key.to_string()).or_default();
            state.counters = *counters;
        }
    }
}

impl StateStore for MemoryStore {
    fn apply(&self, change: &ChangeSet) -> Result<(), StoreError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("injected failure".into()));
        }

        {
            let mut inner = self.lock();
            for op in &change.ops {
                apply_op(&mut inner, change.symbol.as_str(), op);
            }
        }

        // State is committed; the same apply now delivers its bound
        // publications. Per-symbol ordering holds because each symbol has
        // a single writer.
        let sink = self.sink.read().expect("sink lock poisoned").clone();
        if let Some(sink) = sink {
            for publication in &change.publications {
                sink.deliver(publication);
            }
        }
        Ok(())
    }

    fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.write().expect("sink lock poisoned") = Some(sink);
    }

    fn load_symbol(&self, symbol: &Symbol) -> Result<SymbolSnapshot, StoreError> {
        let inner = self.lock();
        let Some(state) = inner.symbols.get(symbol.as_str()) else {
            return Ok(SymbolSnapshot::default());
        };

        let collect_queues = |levels: &BTreeMap<Price, LevelRecord>| {
            levels
                .iter()
                .map(|(price, level)| (*price, level.queue.iter().copied().collect()))
                .collect::<Vec<(Price, Vec<OrderId>)>>()
        };

        let bid_queues = collect_queues(&state.bids);
        let ask_queues = collect_queues(&state.asks);
        let stop_order_ids: Vec<OrderId> = state.stops.iter().copied().collect();

        let live_ids = bid_queues
            .iter()
            .chain(ask_queues.iter())
            .flat_map(|(_, queue)| queue.iter().copied())
            .chain(stop_order_ids.iter().copied());

        let mut orders = Vec::new();
        for id in live_ids {
            if let Some(order) = inner.orders.get(&id) {
                orders.push(order.clone());
            }
        }

        Ok(SymbolSnapshot {
            orders,
            bid_queues,
            ask_queues,
            stop_order_ids,
            counters: state.counters,
        })
    }

    fn book_snapshot(&self, symbol: &Symbol, depth: usize) -> Result<BookSnapshot, StoreError> {
        let inner = self.lock();
        let (bids, asks, sequence) = match inner.symbols.get(symbol.as_str()) {
            Some(state) => {
                let view = |price: &Price, level: &LevelRecord| LevelView {
                    price: *price,
                    total_quantity: level.total_quantity,
                    order_count: level.order_count,
                };
                let bids: Vec<LevelView> = state
                    .bids
                    .iter()
                    .rev()
                    .take(depth)
                    .map(|(p, l)| view(p, l))
                    .collect();
                let asks: Vec<LevelView> = state
                    .asks
                    .iter()
                    .take(depth)
                    .map(|(p, l)| view(p, l))
                    .collect();
                (bids, asks, state.counters.next_event_sequence.saturating_sub(1))
            }
            None => (Vec::new(), Vec::new(), 0),
        };

        Ok(BookSnapshot {
            symbol: symbol.clone(),
            bids,
            asks,
            sequence,
            timestamp: clock::unix_nanos(),
        })
    }

    fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.get(&order_id).cloned())
    }

    fn user_orders(&self, user_id: UserId) -> Result<Vec<Order>, StoreError> {
        let inner = self.lock();
        let mut orders: Vec<Order> = inner
            .user_orders
            .get(&user_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.orders.get(id).cloned())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    fn recent_trades(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Trade>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .symbols
            .get(symbol.as_str())
            .map(|state| state.trades.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    fn next_order_id(&self) -> Result<u64, StoreError> {
        Ok(self.lock().max_order_id + 1)
    }
}
