//! Command surface of the core
//!
//! Requests are validated before they reach a symbol worker; validation
//! failures return synchronously and never create an order record.

use tokio::sync::oneshot;
use types::errors::{CoreError, ValidationError};
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, OrderType, Side};
use types::trade::Trade;

/// A submit request as it arrives from the adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
}

/// Synchronous result of a submit: the trades list covers everything the
/// command executed, including stop-cascade fills.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub trades: Vec<Trade>,
}

/// Synchronous result of a cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelOutcome {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Commands serialized through a symbol worker's queue.
#[derive(Debug)]
pub enum Command {
    Submit {
        order: Order,
        reply: oneshot::Sender<Result<SubmitOutcome, CoreError>>,
    },
    Cancel {
        order_id: OrderId,
        user_id: UserId,
        reply: oneshot::Sender<Result<CancelOutcome, CoreError>>,
    },
}

/// Shape checks on a submit request.
pub fn validate(request: &SubmitRequest) -> Result<(), ValidationError> {
    if request.quantity.is_zero() {
        return Err(ValidationError::NonPositiveQuantity);
    }
    match request.order_type {
        OrderType::Limit => {
            if request.price.is_none() {
                return Err(ValidationError::MissingLimitPrice);
            }
        }
        OrderType::Market => {
            if request.price.is_some() {
                return Err(ValidationError::UnexpectedPrice);
            }
        }
        OrderType::Stop => {
            if request.stop_price.is_none() {
                return Err(ValidationError::MissingStopPrice);
            }
        }
    }
    Ok(())
}
