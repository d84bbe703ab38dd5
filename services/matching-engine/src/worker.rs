//! Symbol worker loop
//!
//! Exactly one worker task per symbol consumes that symbol's command queue,
//! so all book mutations are serialized. Each command runs to completion:
//! match in memory, then apply the change-set with bounded retry. Event
//! delivery is the store's job, not the worker's: the publications bound
//! to the change-set reach the bus inside the same apply, so a command
//! either commits and delivers or does neither.
//!
//! When the retry budget is exhausted the worker reloads its in-memory
//! state from the committed store state, so the failed command leaves no
//! partial effect anywhere.

use crate::commands::{CancelOutcome, Command, SubmitOutcome};
use crate::matcher::SymbolEngine;
use state_store::{RetryPolicy, StateStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use types::clock;
use types::errors::{CancelError, CoreError};
use types::ids::{OrderId, UserId};
use types::order::Order;

pub(crate) async fn run_worker(
    mut engine: SymbolEngine,
    store: Arc<dyn StateStore>,
    retry: RetryPolicy,
    mut queue: mpsc::Receiver<Command>,
) {
    info!(symbol = %engine.symbol(), "symbol worker started");

    while let Some(command) = queue.recv().await {
        match command {
            Command::Submit { order, reply } => {
                let result = handle_submit(&mut engine, &store, &retry, order).await;
                let _ = reply.send(result);
            }
            Command::Cancel {
                order_id,
                user_id,
                reply,
            } => {
                let result = handle_cancel(&mut engine, &store, &retry, order_id, user_id).await;
                let _ = reply.send(result);
            }
        }
    }

    // Queue drained and all senders dropped: shutdown.
    if let Err(e) = store.sync() {
        warn!(symbol = %engine.symbol(), error = %e, "store sync on shutdown failed");
    }
    info!(symbol = %engine.symbol(), "symbol worker drained and stopped");
}

async fn handle_submit(
    engine: &mut SymbolEngine,
    store: &Arc<dyn StateStore>,
    retry: &RetryPolicy,
    order: Order,
) -> Result<SubmitOutcome, CoreError> {
    let now = clock::unix_nanos();
    let effects = engine.submit(order, now).inspect_err(|e| {
        if matches!(e, CoreError::InvariantViolation(_)) {
            engine.halt();
        }
    })?;

    apply_with_retry(engine, store, retry, &effects.change).await?;

    Ok(SubmitOutcome {
        order_id: effects.order.id,
        status: effects.order.status,
        trades: effects.trades,
    })
}

async fn handle_cancel(
    engine: &mut SymbolEngine,
    store: &Arc<dyn StateStore>,
    retry: &RetryPolicy,
    order_id: OrderId,
    user_id: UserId,
) -> Result<CancelOutcome, CoreError> {
    let now = clock::unix_nanos();
    let effects = match engine.cancel(order_id, user_id, now) {
        Ok(effects) => effects,
        Err(CoreError::Cancel(CancelError::NotFound(_))) => {
            // Not live on the book or stop table: the order record decides
            // between AlreadyTerminal and truly unknown.
            return Err(resolve_unknown_cancel(store, order_id, user_id));
        }
        Err(e) => {
            if matches!(e, CoreError::InvariantViolation(_)) {
                engine.halt();
            }
            return Err(e);
        }
    };

    apply_with_retry(engine, store, retry, &effects.change).await?;

    Ok(CancelOutcome {
        order_id: effects.order.id,
        status: effects.order.status,
    })
}

fn resolve_unknown_cancel(
    store: &Arc<dyn StateStore>,
    order_id: OrderId,
    user_id: UserId,
) -> CoreError {
    match store.order(order_id) {
        Ok(Some(order)) => {
            if order.user_id != user_id {
                CancelError::NotOwned(order_id).into()
            } else if order.status.is_terminal() {
                CancelError::AlreadyTerminal(order_id).into()
            } else {
                // A live record missing from the book would be an index
                // bug; surface it as not found rather than guessing.
                CancelError::NotFound(order_id).into()
            }
        }
        Ok(None) => CancelError::NotFound(order_id).into(),
        Err(e) => CoreError::EngineUnavailable(e.to_string()),
    }
}

async fn apply_with_retry(
    engine: &mut SymbolEngine,
    store: &Arc<dyn StateStore>,
    retry: &RetryPolicy,
    change: &state_store::ChangeSet,
) -> Result<(), CoreError> {
    let mut attempt = 0u32;
    loop {
        match store.apply(change) {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt + 1 < retry.max_attempts => {
                warn!(
                    symbol = %engine.symbol(),
                    attempt,
                    error = %e,
                    "transient store failure, backing off"
                );
                tokio::time::sleep(retry.delay(attempt)).await;
                attempt += 1;
            }
            Err(e) => {
                error!(
                    symbol = %engine.symbol(),
                    error = %e,
                    "apply failed, re-syncing book from committed state"
                );
                match store.load_symbol(engine.symbol()) {
                    Ok(snapshot) => engine.resync(&snapshot),
                    Err(load_err) => {
                        error!(
                            symbol = %engine.symbol(),
                            error = %load_err,
                            "re-sync failed, halting symbol"
                        );
                        engine.halt();
                    }
                }
                return Err(CoreError::EngineUnavailable(e.to_string()));
            }
        }
    }
}
