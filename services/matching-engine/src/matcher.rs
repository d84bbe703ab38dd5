//! Per-symbol matching state machine
//!
//! `SymbolEngine` owns one symbol's book, stop table, and counters. A
//! Submit or Cancel command produces a [`CommandEffects`]: the final taker
//! state, the trades, and the change-set carrying the command's events as
//! publications, which the store delivers inside the same atomic apply.
//!
//! The matcher never touches the store itself (that is the worker's job),
//! but its in-memory mutations and the change-set are built in lockstep, so
//! a successful apply leaves store and book identical.

use market_stream::events::{EventEnvelope, EventPayload, LevelDelta};
use state_store::{ChangeSet, LevelView, StateOp, SymbolCounters, SymbolSnapshot};
use tracing::error;
use types::errors::{CancelError, CoreError};
use types::ids::{OrderId, Symbol, TradeId, UserId};
use types::order::{Order, OrderType, RejectReason, Side};
use types::trade::Trade;

use crate::book::OrderBook;
use crate::stops::StopBook;

/// Everything one command produced.
#[derive(Debug, Clone)]
pub struct CommandEffects {
    /// Final state of the order the command addressed.
    pub order: Order,
    /// Trades executed by this command, including stop-cascade fills.
    pub trades: Vec<Trade>,
    /// The atomic durable effect. Carries the command's events as
    /// publications, in sequence order; the store delivers them to the
    /// bus inside the same apply.
    pub change: ChangeSet,
}

#[derive(Default)]
struct Ctx {
    trades: Vec<Trade>,
    payloads: Vec<EventPayload>,
    ops: Vec<StateOp>,
    touched: Vec<(Side, LevelView)>,
}

impl Ctx {
    /// Record a level's post-command aggregate; the latest write wins.
    fn touch(&mut self, side: Side, level: LevelView) {
        if let Some(slot) = self
            .touched
            .iter_mut()
            .find(|(s, l)| *s == side && l.price == level.price)
        {
            slot.1 = level;
        } else {
            self.touched.push((side, level));
        }
    }
}

fn order_changed(order: &Order) -> EventPayload {
    EventPayload::OrderChanged {
        order_id: order.id,
        user_id: order.user_id,
        side: order.side,
        order_type: order.order_type,
        status: order.status,
        quantity: order.quantity,
        filled_quantity: order.filled_quantity,
        price: order.price,
        stop_price: order.stop_price,
    }
}

/// Single-writer matching engine for one symbol.
pub struct SymbolEngine {
    symbol: Symbol,
    book: OrderBook,
    stops: StopBook,
    counters: SymbolCounters,
    halted: bool,
}

impl SymbolEngine {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            book: OrderBook::new(symbol.clone()),
            stops: StopBook::new(),
            counters: normalize(SymbolCounters::default()),
            symbol,
            halted: false,
        }
    }

    /// Rebuild the engine from committed store state.
    pub fn restore(symbol: Symbol, snapshot: &SymbolSnapshot) -> Self {
        let book = OrderBook::restore(symbol.clone(), snapshot);
        let mut stops = StopBook::new();
        for order in &snapshot.orders {
            if snapshot.stop_order_ids.contains(&order.id) {
                stops.insert(order.clone());
            }
        }
        Self {
            book,
            stops,
            counters: normalize(snapshot.counters),
            symbol,
            halted: false,
        }
    }

    /// Throw away in-memory state and reload from committed store state.
    /// Called by the worker after a failed apply so no partial effect
    /// survives.
    pub fn resync(&mut self, snapshot: &SymbolSnapshot) {
        let fresh = Self::restore(self.symbol.clone(), snapshot);
        self.book = fresh.book;
        self.stops = fresh.stops;
        self.counters = fresh.counters;
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Stop processing commands for this symbol until operator restart.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    pub fn counters(&self) -> SymbolCounters {
        self.counters
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn stops(&self) -> &StopBook {
        &self.stops
    }

    /// Process a submit command.
    ///
    /// The order arrives validated (quantity positive, price presence per
    /// type) with its id assigned; the engine assigns the arrival sequence.
    pub fn submit(&mut self, mut order: Order, now: i64) -> Result<CommandEffects, CoreError> {
        self.ensure_running()?;

        let mut ctx = Ctx::default();
        order.sequence = self.counters.next_order_sequence;
        self.counters.next_order_sequence += 1;
        ctx.ops.push(StateOp::IndexOrder {
            user_id: order.user_id,
            order_id: order.id,
        });

        if order.order_type == OrderType::Stop {
            let trigger = order
                .stop_price
                .ok_or(types::errors::ValidationError::MissingStopPrice)?;
            let fires_now = self
                .counters
                .last_trade_price
                .is_some_and(|last| StopBook::crosses(order.side, trigger, last));

            if !fires_now {
                self.stops.insert(order.clone());
                ctx.ops.push(StateOp::IndexStop { order_id: order.id });
                ctx.ops.push(StateOp::PutOrder(order.clone()));
                ctx.payloads.push(order_changed(&order));
                return Ok(self.finish(order, now, ctx));
            }
            // Trigger already crossed on arrival: convert and match now.
            order.order_type = OrderType::Market;
        }

        self.match_incoming(&mut order, now, &mut ctx)?;
        self.settle_taker(&mut order, now, &mut ctx)?;
        self.cascade_stops(now, &mut ctx)?;
        self.verify_book()?;

        Ok(self.finish(order, now, ctx))
    }

    /// Process a cancel command.
    ///
    /// Resting limit orders and held stop orders are cancellable. Unknown
    /// ids surface `NotFound`; the worker distinguishes `AlreadyTerminal`
    /// from truly unknown ids against the store.
    pub fn cancel(
        &mut self,
        order_id: OrderId,
        user_id: UserId,
        now: i64,
    ) -> Result<CommandEffects, CoreError> {
        self.ensure_running()?;

        let mut ctx = Ctx::default();

        match self.book.remove_resting(order_id, user_id) {
            Ok((mut order, level)) => {
                let remaining = order.remaining();
                order.cancel(now);
                ctx.ops.push(StateOp::RemoveResting {
                    side: order.side,
                    price: level.price,
                    order_id,
                    quantity: remaining,
                });
                ctx.ops.push(StateOp::PutOrder(order.clone()));
                ctx.payloads.push(order_changed(&order));
                ctx.touch(order.side, level);
                return Ok(self.finish(order, now, ctx));
            }
            Err(CancelError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let mut order = self.stops.remove(order_id, user_id)?;
        order.cancel(now);
        ctx.ops.push(StateOp::RemoveStop { order_id });
        ctx.ops.push(StateOp::PutOrder(order.clone()));
        ctx.payloads.push(order_changed(&order));
        Ok(self.finish(order, now, ctx))
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.halted {
            Err(CoreError::EngineUnavailable(format!(
                "matcher for {} is halted",
                self.symbol
            )))
        } else {
            Ok(())
        }
    }

    /// Walk the opposite side best-first, filling head makers until the
    /// taker is done, liquidity runs out, or the limit price stops
    /// crossing.
    fn match_incoming(
        &mut self,
        taker: &mut Order,
        now: i64,
        ctx: &mut Ctx,
    ) -> Result<(), CoreError> {
        let maker_side = taker.side.opposite();

        while !taker.remaining().is_zero() {
            let Some((price, _, maker_remaining)) = self.book.head_of_best(maker_side) else {
                break;
            };

            if taker.order_type == OrderType::Limit {
                let Some(limit) = taker.price else {
                    return Err(CoreError::InvariantViolation(
                        "limit order without a price reached the matcher".into(),
                    ));
                };
                let crosses = match taker.side {
                    Side::Buy => price <= limit,
                    Side::Sell => price >= limit,
                };
                if !crosses {
                    break;
                }
            }

            let quantity = taker.remaining().min(maker_remaining);
            let fill = self.book.fill_best_maker(maker_side, quantity, now)?;
            taker.add_fill(quantity, now);

            let trade_id = TradeId::new(self.counters.next_trade_id);
            self.counters.next_trade_id += 1;
            let (buy_order_id, sell_order_id) = match taker.side {
                Side::Buy => (taker.id, fill.maker.id),
                Side::Sell => (fill.maker.id, taker.id),
            };
            let trade = Trade::new(
                trade_id,
                self.symbol.clone(),
                buy_order_id,
                sell_order_id,
                fill.maker.id,
                taker.id,
                fill.price,
                quantity,
                now,
            );
            self.counters.last_trade_price = Some(fill.price);

            if fill.maker_removed {
                ctx.ops.push(StateOp::RemoveResting {
                    side: maker_side,
                    price: fill.price,
                    order_id: fill.maker.id,
                    quantity,
                });
            } else {
                ctx.ops.push(StateOp::ReduceResting {
                    side: maker_side,
                    price: fill.price,
                    order_id: fill.maker.id,
                    quantity,
                });
            }
            ctx.ops.push(StateOp::PutOrder(fill.maker.clone()));
            ctx.ops.push(StateOp::AppendTrade(trade.clone()));

            ctx.payloads.push(EventPayload::TradeExecuted {
                trade_id: trade.id,
                buy_order_id: trade.buy_order_id,
                sell_order_id: trade.sell_order_id,
                maker_order_id: trade.maker_order_id,
                taker_order_id: trade.taker_order_id,
                price: trade.price,
                quantity: trade.quantity,
            });
            ctx.payloads.push(order_changed(&fill.maker));
            ctx.touch(maker_side, fill.level.clone());
            ctx.trades.push(trade);
        }

        Ok(())
    }

    /// Decide what happens to the taker's remainder and emit its terminal
    /// (or resting) state change.
    fn settle_taker(
        &mut self,
        order: &mut Order,
        now: i64,
        ctx: &mut Ctx,
    ) -> Result<(), CoreError> {
        if !order.is_filled() && order.order_type == OrderType::Limit {
            let level = self.book.insert_resting(order.clone())?;
            ctx.ops.push(StateOp::InsertResting {
                side: order.side,
                price: level.price,
                order_id: order.id,
                quantity: order.remaining(),
            });
            ctx.touch(order.side, level);
        } else if order.order_type == OrderType::Market && !order.has_fills() {
            order.reject(RejectReason::NoLiquidity, now);
        }

        ctx.ops.push(StateOp::PutOrder(order.clone()));
        ctx.payloads.push(order_changed(order));
        Ok(())
    }

    /// Fire stops crossed by the last trade price until a fixed point.
    ///
    /// Triggered stops convert to Market and run through the match loop in
    /// arrival order; their trades can trigger further stops, but only
    /// those that were in the table when the command started, so the loop
    /// is bounded.
    fn cascade_stops(&mut self, now: i64, ctx: &mut Ctx) -> Result<(), CoreError> {
        if ctx.trades.is_empty() {
            return Ok(());
        }

        loop {
            let Some(last) = self.counters.last_trade_price else {
                break;
            };
            let triggered = self.stops.take_triggered(last);
            if triggered.is_empty() {
                break;
            }

            for mut stop in triggered {
                ctx.ops.push(StateOp::RemoveStop { order_id: stop.id });
                stop.order_type = OrderType::Market;
                self.match_incoming(&mut stop, now, ctx)?;
                self.settle_taker(&mut stop, now, ctx)?;
            }
        }

        Ok(())
    }

    /// Post-command consistency checks. A failure halts this symbol; the
    /// engine never repairs locally.
    fn verify_book(&mut self) -> Result<(), CoreError> {
        if self.book.is_crossed() {
            self.halted = true;
            error!(symbol = %self.symbol, "crossed book after command, halting matcher");
            return Err(CoreError::InvariantViolation(format!(
                "crossed book on {}",
                self.symbol
            )));
        }
        if !self.book.check_aggregates() {
            self.halted = true;
            error!(symbol = %self.symbol, "level aggregate mismatch, halting matcher");
            return Err(CoreError::InvariantViolation(format!(
                "level aggregate mismatch on {}",
                self.symbol
            )));
        }
        Ok(())
    }

    /// Number the events and bind them to the change-set as publications,
    /// then persist the counters.
    fn finish(&mut self, order: Order, now: i64, mut ctx: Ctx) -> CommandEffects {
        if !ctx.touched.is_empty() {
            let levels = ctx
                .touched
                .iter()
                .map(|(side, level)| LevelDelta {
                    side: *side,
                    price: level.price,
                    total_quantity: level.total_quantity,
                    order_count: level.order_count,
                })
                .collect();
            ctx.payloads.push(EventPayload::BookChanged { levels });
        }

        let mut change = ChangeSet::new(self.symbol.clone());
        change.ops = ctx.ops;

        for payload in ctx.payloads {
            let sequence = self.counters.next_event_sequence;
            self.counters.next_event_sequence += 1;
            let envelope = EventEnvelope::new(self.symbol.clone(), sequence, now, payload);
            match serde_json::to_string(&envelope) {
                Ok(json) => change.publish(envelope.channel(), json),
                Err(e) => error!(error = %e, "event envelope serialization failed"),
            }
        }

        change.push(StateOp::SetCounters(self.counters));

        CommandEffects {
            order,
            trades: ctx.trades,
            change,
        }
    }
}

/// Counters are 1-based: sequences and ids start at 1.
fn normalize(mut counters: SymbolCounters) -> SymbolCounters {
    counters.next_order_sequence = counters.next_order_sequence.max(1);
    counters.next_trade_id = counters.next_trade_id.max(1);
    counters.next_event_sequence = counters.next_event_sequence.max(1);
    counters
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::order::OrderStatus;

    fn engine() -> SymbolEngine {
        SymbolEngine::new(Symbol::new("BTC/USD"))
    }

    /// Decode the events a command bound to its change-set.
    fn published(effects: &CommandEffects) -> Vec<EventEnvelope> {
        effects
            .change
            .publications
            .iter()
            .map(|p| serde_json::from_str(&p.payload).unwrap())
            .collect()
    }

    fn order(
        id: u64,
        user: u64,
        side: Side,
        order_type: OrderType,
        qty: &str,
        price: Option<&str>,
        stop: Option<&str>,
    ) -> Order {
        Order::new(
            OrderId::new(id),
            UserId::new(user),
            Symbol::new("BTC/USD"),
            side,
            order_type,
            qty.parse().unwrap(),
            price.map(|p| p.parse().unwrap()),
            stop.map(|p| p.parse().unwrap()),
            1_708_123_456_789_000_000,
        )
    }

    fn limit(id: u64, user: u64, side: Side, price: &str, qty: &str) -> Order {
        order(id, user, side, OrderType::Limit, qty, Some(price), None)
    }

    #[test]
    fn test_resting_order_no_match() {
        let mut engine = engine();
        let effects = engine.submit(limit(1, 1, Side::Buy, "50000", "1.0"), 1).unwrap();

        assert_eq!(effects.order.status, OrderStatus::Pending);
        assert!(effects.trades.is_empty());
        assert_eq!(engine.book().best_bid(), Some("50000".parse().unwrap()));
        // OrderChanged + BookChanged
        let events = published(&effects);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn test_full_match_at_same_price() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Sell, "50000", "1.0"), 1).unwrap();
        let effects = engine.submit(limit(2, 2, Side::Buy, "50000", "1.0"), 2).unwrap();

        assert_eq!(effects.order.status, OrderStatus::Filled);
        assert_eq!(effects.trades.len(), 1);
        let trade = &effects.trades[0];
        assert_eq!(trade.price, "50000".parse().unwrap());
        assert_eq!(trade.maker_order_id, OrderId::new(1));
        assert_eq!(trade.taker_order_id, OrderId::new(2));
        assert_eq!(trade.buy_order_id, OrderId::new(2));
        assert!(engine.book().best_ask().is_none());
        assert!(engine.book().best_bid().is_none());
    }

    #[test]
    fn test_execution_at_maker_price() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Sell, "50000", "1.0"), 1).unwrap();
        // Taker willing to pay more still executes at the maker's ask.
        let effects = engine.submit(limit(2, 2, Side::Buy, "50500", "1.0"), 2).unwrap();

        assert_eq!(effects.trades[0].price, "50000".parse().unwrap());
    }

    #[test]
    fn test_partial_fill_rests_remainder() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Sell, "50000", "0.5"), 1).unwrap();
        let effects = engine.submit(limit(2, 2, Side::Buy, "50000", "1.0"), 2).unwrap();

        assert_eq!(effects.order.status, OrderStatus::PartiallyFilled);
        assert_eq!(effects.order.remaining(), "0.5".parse().unwrap());
        // Remainder rests on the buy side at the taker's limit.
        assert_eq!(engine.book().best_bid(), Some("50000".parse().unwrap()));
    }

    #[test]
    fn test_no_cross_rests() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Sell, "51000", "1.0"), 1).unwrap();
        let effects = engine.submit(limit(2, 2, Side::Buy, "50000", "1.0"), 2).unwrap();

        assert!(effects.trades.is_empty());
        assert_eq!(effects.order.status, OrderStatus::Pending);
        assert!(!engine.book().is_crossed());
    }

    #[test]
    fn test_market_rejected_without_liquidity() {
        let mut engine = engine();
        let effects = engine
            .submit(order(1, 1, Side::Buy, OrderType::Market, "1.0", None, None), 1)
            .unwrap();

        assert_eq!(
            effects.order.status,
            OrderStatus::Rejected(RejectReason::NoLiquidity)
        );
        assert!(effects.trades.is_empty());
        // Terminal OrderChanged still emitted.
        let events = published(&effects);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].payload, EventPayload::OrderChanged { .. }));
    }

    #[test]
    fn test_market_partial_never_rests() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Sell, "50000", "0.4"), 1).unwrap();
        let effects = engine
            .submit(order(2, 2, Side::Buy, OrderType::Market, "1.0", None, None), 2)
            .unwrap();

        assert_eq!(effects.order.status, OrderStatus::PartiallyFilled);
        assert_eq!(effects.trades.len(), 1);
        assert!(engine.book().best_bid().is_none());
    }

    #[test]
    fn test_event_sequences_contiguous_across_commands() {
        let mut engine = engine();
        let first = engine.submit(limit(1, 1, Side::Sell, "50000", "1.0"), 1).unwrap();
        let second = engine.submit(limit(2, 2, Side::Buy, "50000", "1.0"), 2).unwrap();

        let mut sequences: Vec<u64> = published(&first)
            .iter()
            .chain(published(&second).iter())
            .map(|e| e.sequence)
            .collect();
        let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
        sequences.sort_unstable();
        assert_eq!(sequences, expected);
    }

    #[test]
    fn test_cancel_resting_then_terminal() {
        let mut engine = engine();
        engine.submit(limit(7, 1, Side::Buy, "100", "1.0"), 1).unwrap();

        let effects = engine.cancel(OrderId::new(7), UserId::new(1), 2).unwrap();
        assert_eq!(effects.order.status, OrderStatus::Cancelled);
        assert!(engine.book().best_bid().is_none());

        // Now gone from the book: the engine reports NotFound and the
        // worker resolves AlreadyTerminal against the store.
        let err = engine.cancel(OrderId::new(7), UserId::new(1), 3).unwrap_err();
        assert_eq!(err, CoreError::Cancel(CancelError::NotFound(OrderId::new(7))));
    }

    #[test]
    fn test_cancel_not_owned() {
        let mut engine = engine();
        engine.submit(limit(7, 1, Side::Buy, "100", "1.0"), 1).unwrap();

        let err = engine.cancel(OrderId::new(7), UserId::new(2), 2).unwrap_err();
        assert_eq!(err, CoreError::Cancel(CancelError::NotOwned(OrderId::new(7))));
        assert_eq!(engine.book().best_bid(), Some("100".parse().unwrap()));
    }

    #[test]
    fn test_stop_rests_until_triggered() {
        let mut engine = engine();
        let effects = engine
            .submit(order(1, 1, Side::Sell, OrderType::Stop, "1.0", None, Some("99")), 1)
            .unwrap();

        assert_eq!(effects.order.status, OrderStatus::Pending);
        assert!(engine.stops().contains(OrderId::new(1)));
        assert!(engine.book().best_ask().is_none());
    }

    #[test]
    fn test_stop_triggers_on_trade_and_cascades() {
        let mut engine = engine();
        // Seed liquidity and a last price of 100.
        engine.submit(limit(1, 1, Side::Buy, "100", "1.0"), 1).unwrap();
        engine.submit(limit(2, 2, Side::Sell, "100", "1.0"), 2).unwrap();

        // Bid at 97 for the stop to hit, and a resting sell-stop at 99.
        engine.submit(limit(3, 3, Side::Buy, "97", "1.0"), 3).unwrap();
        engine
            .submit(order(4, 4, Side::Sell, OrderType::Stop, "1.0", None, Some("99")), 4)
            .unwrap();

        // A trade at 98 (bid 5 crossed by sell 6) triggers the stop.
        engine.submit(limit(5, 5, Side::Buy, "98", "0.5"), 5).unwrap();
        let effects = engine.submit(limit(6, 6, Side::Sell, "98", "0.5"), 6).unwrap();

        // Trigger command's own trade first, stop's fill after.
        assert_eq!(effects.trades.len(), 2);
        assert_eq!(effects.trades[0].price, "98".parse().unwrap());
        assert_eq!(effects.trades[1].taker_order_id, OrderId::new(4));
        assert_eq!(effects.trades[1].price, "97".parse().unwrap());
        assert!(!engine.stops().contains(OrderId::new(4)));
    }

    #[test]
    fn test_stop_already_crossed_fires_on_arrival() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Buy, "100", "1.0"), 1).unwrap();
        engine.submit(limit(2, 2, Side::Sell, "100", "0.4"), 2).unwrap();
        // Last trade price is 100; a sell-stop at trigger 100 fires now.
        let effects = engine
            .submit(order(3, 3, Side::Sell, OrderType::Stop, "0.6", None, Some("100")), 3)
            .unwrap();

        assert_eq!(effects.order.status, OrderStatus::Filled);
        assert_eq!(effects.trades.len(), 1);
        assert_eq!(effects.trades[0].price, "100".parse().unwrap());
    }

    #[test]
    fn test_triggered_stop_without_liquidity_rejected() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Buy, "100", "1.0"), 1).unwrap();
        engine
            .submit(order(2, 2, Side::Sell, OrderType::Stop, "1.0", None, Some("99")), 2)
            .unwrap();

        // Sell 3 consumes the whole bid at 100 → last price 100, no
        // liquidity left; the stop stays (100 > 99).
        engine.submit(limit(3, 3, Side::Sell, "100", "1.0"), 3).unwrap();
        assert!(engine.stops().contains(OrderId::new(2)));

        // New bid at 99 gets consumed at exactly 99 → stop triggers into
        // an empty book and is rejected.
        engine.submit(limit(4, 4, Side::Buy, "99", "0.5"), 4).unwrap();
        let effects = engine.submit(limit(5, 5, Side::Sell, "99", "0.5"), 5).unwrap();

        let stop_event = published(&effects)
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::OrderChanged { order_id, status, .. }
                    if *order_id == OrderId::new(2) =>
                {
                    Some(*status)
                }
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(stop_event, OrderStatus::Rejected(RejectReason::NoLiquidity));
        assert!(!engine.stops().contains(OrderId::new(2)));
    }

    #[test]
    fn test_resync_discards_uncommitted_state() {
        let mut engine = engine();
        engine.submit(limit(1, 1, Side::Buy, "100", "1.0"), 1).unwrap();

        // Pretend nothing was ever committed.
        engine.resync(&SymbolSnapshot::default());
        assert!(engine.book().best_bid().is_none());
        assert_eq!(engine.counters().next_event_sequence, 1);
    }
}
