//! Market data query handlers

use crate::error::AppError;
use crate::models::{DepthParams, TradesParams};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use state_store::BookSnapshot;
use types::ids::Symbol;
use types::trade::Trade;

const DEFAULT_DEPTH: usize = 10;
const DEFAULT_TRADE_LIMIT: usize = 50;

fn known_symbol(state: &AppState, raw: &str) -> Result<Symbol, AppError> {
    if !state.core.has_symbol(raw) {
        return Err(AppError::NotFound(format!("unknown symbol: {raw}")));
    }
    Symbol::try_new(raw).ok_or_else(|| AppError::BadRequest(format!("malformed symbol: {raw}")))
}

pub async fn order_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<DepthParams>,
) -> Result<Json<BookSnapshot>, AppError> {
    let symbol = known_symbol(&state, &symbol)?;
    let snapshot = state
        .store
        .book_snapshot(&symbol, params.depth.unwrap_or(DEFAULT_DEPTH))
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(snapshot))
}

pub async fn recent_trades(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<TradesParams>,
) -> Result<Json<Vec<Trade>>, AppError> {
    let symbol = known_symbol(&state, &symbol)?;
    let trades = state
        .store
        .recent_trades(&symbol, params.limit.unwrap_or(DEFAULT_TRADE_LIMIT))
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(trades))
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.store.next_order_id() {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({"status": "healthy", "store": "connected"})),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "store": e.to_string()})),
        ),
    }
}
