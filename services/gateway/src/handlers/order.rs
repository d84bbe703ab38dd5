//! Order command handlers

use crate::error::AppError;
use crate::models::{
    CancelOrderResponse, SubmitOrderRequest, SubmitOrderResponse, UserParams,
};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::Json;
use types::ids::{OrderId, UserId};
use types::order::Order;

pub async fn submit_order(
    State(state): State<AppState>,
    Json(payload): Json<SubmitOrderRequest>,
) -> Result<Json<SubmitOrderResponse>, AppError> {
    state
        .rate_limiter
        .check(&format!("{}:order_submit", payload.user_id), 20, 20.0)?;

    let request = payload.into_core()?;
    let outcome = state.core.submit_order(request).await?;

    Ok(Json(SubmitOrderResponse {
        order_id: outcome.order_id,
        status: outcome.status,
        trades: outcome.trades,
    }))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
    Query(params): Query<UserParams>,
) -> Result<Json<CancelOrderResponse>, AppError> {
    state
        .rate_limiter
        .check(&format!("{}:order_cancel", params.user_id), 50, 50.0)?;

    let outcome = state
        .core
        .cancel_order(UserId::new(params.user_id), OrderId::new(order_id))
        .await?;

    Ok(Json(CancelOrderResponse {
        order_id: outcome.order_id,
        status: outcome.status,
    }))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<u64>,
    Query(params): Query<UserParams>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .store
        .order(OrderId::new(order_id))
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?
        .ok_or_else(|| AppError::NotFound(format!("order not found: {order_id}")))?;

    if order.user_id != UserId::new(params.user_id) {
        return Err(AppError::Forbidden(format!(
            "order {order_id} belongs to another user"
        )));
    }
    Ok(Json(order))
}

pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<Vec<Order>>, AppError> {
    let orders = state
        .store
        .user_orders(UserId::new(user_id))
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(orders))
}
