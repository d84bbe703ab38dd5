//! HTTP/WebSocket routing

use crate::config::Settings;
use crate::handlers::{market, order, ws};
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn create_router(state: AppState, settings: &Settings) -> Router {
    let api_routes = Router::new()
        .route("/orders", post(order::submit_order))
        .route(
            "/orders/:id",
            get(order::get_order).delete(order::cancel_order),
        )
        .route("/users/:id/orders", get(order::list_user_orders))
        .route("/market/orderbook/:symbol", get(market::order_book))
        .route("/market/trades/:symbol", get(market::recent_trades));

    Router::new()
        .nest("/v1", api_routes)
        .route("/ws/orderbook/:symbol", get(ws::orderbook_stream))
        .route("/health", get(market::health))
        .layer(cors_layer(settings))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    if settings.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = settings
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}
