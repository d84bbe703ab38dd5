//! Shared application state

use crate::config::Settings;
use crate::rate_limit::RateLimiter;
use market_stream::EventBus;
use matching_engine::ExchangeCore;
use state_store::StateStore;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ExchangeCore>,
    pub store: Arc<dyn StateStore>,
    pub bus: Arc<EventBus>,
    pub rate_limiter: Arc<RateLimiter>,
    pub settings: Arc<Settings>,
    /// Flipped to true when the server begins shutting down; sessions
    /// close with a GoingAway reason.
    pub shutdown: watch::Receiver<bool>,
}
