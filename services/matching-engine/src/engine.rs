//! Exchange core: command routing across symbol workers
//!
//! One worker task per configured symbol, each fed by its own bounded
//! queue. Commands for the same symbol are applied in queue order; symbols
//! run independently. Order ids are global and monotone, seeded from the
//! store so restarts never reuse one.

use crate::commands::{self, CancelOutcome, Command, SubmitOutcome, SubmitRequest};
use crate::matcher::SymbolEngine;
use crate::worker::run_worker;
use market_stream::EventBus;
use state_store::{RetryPolicy, StateStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::info;
use types::clock;
use types::errors::{CancelError, CoreError};
use types::ids::{OrderId, Symbol, UserId};
use types::order::Order;

const COMMAND_QUEUE_DEPTH: usize = 1024;

/// The matching core: per-symbol workers plus the shared store and bus.
pub struct ExchangeCore {
    routes: RwLock<HashMap<String, mpsc::Sender<Command>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    store: Arc<dyn StateStore>,
    next_order_id: AtomicU64,
}

impl ExchangeCore {
    /// Boot one worker per symbol from committed store state.
    ///
    /// The bus is attached to the store as its event sink, so every
    /// apply's publications are broadcast inside the apply itself.
    pub async fn start(
        symbols: Vec<Symbol>,
        store: Arc<dyn StateStore>,
        bus: Arc<EventBus>,
        retry: RetryPolicy,
    ) -> Result<Self, CoreError> {
        store.set_event_sink(bus);

        let mut routes = HashMap::new();
        let mut workers = Vec::new();

        for symbol in symbols {
            let snapshot = store
                .load_symbol(&symbol)
                .map_err(|e| CoreError::EngineUnavailable(e.to_string()))?;
            let engine = SymbolEngine::restore(symbol.clone(), &snapshot);
            info!(
                symbol = %symbol,
                resting = snapshot.orders.len(),
                "symbol engine restored"
            );

            let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
            workers.push(tokio::spawn(run_worker(
                engine,
                store.clone(),
                retry.clone(),
                rx,
            )));
            routes.insert(symbol.as_str().to_string(), tx);
        }

        let next_order_id = store
            .next_order_id()
            .map_err(|e| CoreError::EngineUnavailable(e.to_string()))?;

        Ok(Self {
            routes: RwLock::new(routes),
            workers: Mutex::new(workers),
            store,
            next_order_id: AtomicU64::new(next_order_id),
        })
    }

    /// Whether a symbol is configured.
    pub fn has_symbol(&self, symbol: &str) -> bool {
        self.read_routes().contains_key(symbol)
    }

    /// Configured symbols.
    pub fn symbols(&self) -> Vec<String> {
        self.read_routes().keys().cloned().collect()
    }

    /// Validate, assign an order id, and run the submit on the symbol's
    /// worker.
    pub async fn submit_order(&self, request: SubmitRequest) -> Result<SubmitOutcome, CoreError> {
        commands::validate(&request)?;
        let sender = self.route(request.symbol.as_str())?;

        let order_id = OrderId::new(self.next_order_id.fetch_add(1, Ordering::SeqCst));
        let order = Order::new(
            order_id,
            request.user_id,
            request.symbol,
            request.side,
            request.order_type,
            request.quantity,
            request.price,
            request.stop_price,
            clock::unix_nanos(),
        );

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Command::Submit {
                order,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoreError::EngineUnavailable("symbol worker stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| CoreError::EngineUnavailable("symbol worker dropped reply".into()))?
    }

    /// Route a cancel to the owning symbol's worker.
    ///
    /// The order record decides the symbol; an id the store has never seen
    /// is `NotFound` without touching any worker.
    pub async fn cancel_order(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<CancelOutcome, CoreError> {
        let record = self
            .store
            .order(order_id)
            .map_err(|e| CoreError::EngineUnavailable(e.to_string()))?
            .ok_or(CancelError::NotFound(order_id))?;

        let sender = self.route(record.symbol.as_str())?;
        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Command::Cancel {
                order_id,
                user_id,
                reply: reply_tx,
            })
            .await
            .map_err(|_| CoreError::EngineUnavailable("symbol worker stopped".into()))?;
        reply_rx
            .await
            .map_err(|_| CoreError::EngineUnavailable("symbol worker dropped reply".into()))?
    }

    /// Drain every symbol queue and stop the workers.
    ///
    /// In-flight commands run to completion; new commands fail with
    /// `EngineUnavailable`.
    pub async fn shutdown(&self) {
        info!("exchange core shutting down, draining symbol queues");
        self.routes
            .write()
            .expect("routes lock poisoned")
            .clear();

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            let _ = handle.await;
        }
        info!("exchange core stopped");
    }

    fn route(&self, symbol: &str) -> Result<mpsc::Sender<Command>, CoreError> {
        self.read_routes()
            .get(symbol)
            .cloned()
            .ok_or_else(|| CoreError::UnknownSymbol(symbol.to_string()))
    }

    fn read_routes(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<String, mpsc::Sender<Command>>> {
        self.routes.read().expect("routes lock poisoned")
    }
}
