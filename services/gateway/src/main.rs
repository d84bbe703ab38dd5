//! Exchange gateway binary
//!
//! Boots the durable store, the event bus, and one matching worker per
//! configured symbol, then serves the REST and WebSocket surface until a
//! shutdown signal drains everything.

mod config;
mod error;
mod handlers;
mod models;
mod rate_limit;
mod router;
mod state;

use crate::config::Settings;
use crate::rate_limit::RateLimiter;
use crate::state::AppState;
use market_stream::EventBus;
use matching_engine::ExchangeCore;
use state_store::{JournalConfig, JournalStore, MemoryStore, RetryPolicy, StateStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use types::ids::Symbol;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    let default_filter = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!(
        listen_addr = %settings.listen_addr,
        symbols = ?settings.symbols,
        durable = settings.durable,
        "starting exchange gateway"
    );

    let store: Arc<dyn StateStore> = if settings.durable {
        Arc::new(JournalStore::open(JournalConfig::new(&settings.data_dir))?)
    } else {
        Arc::new(MemoryStore::new())
    };

    let symbols = settings
        .symbols
        .iter()
        .map(|s| {
            Symbol::try_new(s.as_str())
                .ok_or_else(|| anyhow::anyhow!("malformed symbol in config: {s}"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let bus = Arc::new(EventBus::new(settings.bus_capacity));
    let core = Arc::new(
        ExchangeCore::start(symbols, store.clone(), bus.clone(), RetryPolicy::default()).await?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app_state = AppState {
        core: core.clone(),
        store: store.clone(),
        bus,
        rate_limiter: Arc::new(RateLimiter::new()),
        settings: Arc::new(settings.clone()),
        shutdown: shutdown_rx,
    };

    let app = router::create_router(app_state, &settings);
    let listener = TcpListener::bind(settings.listen_addr).await?;
    info!("listening on {}", settings.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    // Sockets are closed; drain the symbol queues and flush the journal.
    core.shutdown().await;
    store.sync()?;
    info!("exchange gateway stopped");

    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received, closing sessions");
    let _ = shutdown_tx.send(true);
}
