//! Request/response DTOs for the REST surface

use crate::error::AppError;
use matching_engine::SubmitRequest;
use serde::{Deserialize, Serialize};
use types::ids::{OrderId, Symbol, UserId};
use types::numeric::{Price, Quantity};
use types::order::{OrderStatus, OrderType, Side};
use types::trade::Trade;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitOrderRequest {
    pub user_id: u64,
    pub symbol: String,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
}

impl SubmitOrderRequest {
    pub fn into_core(self) -> Result<SubmitRequest, AppError> {
        let symbol = Symbol::try_new(self.symbol.as_str())
            .ok_or_else(|| AppError::BadRequest(format!("malformed symbol: {}", self.symbol)))?;
        Ok(SubmitRequest {
            user_id: UserId::new(self.user_id),
            symbol,
            side: self.side,
            order_type: self.order_type,
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserParams {
    pub user_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOrderResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepthParams {
    pub depth: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradesParams {
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_request_wire_format() {
        let json = r#"{
            "user_id": 7,
            "symbol": "BTC/USD",
            "side": "BUY",
            "type": "LIMIT",
            "quantity": "1.5",
            "price": "50000.25"
        }"#;
        let request: SubmitOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.order_type, OrderType::Limit);
        assert_eq!(request.quantity, "1.5".parse().unwrap());

        let core = request.into_core().unwrap();
        assert_eq!(core.symbol.as_str(), "BTC/USD");
        assert_eq!(core.user_id, UserId::new(7));
    }

    #[test]
    fn test_malformed_symbol_rejected() {
        let request = SubmitOrderRequest {
            user_id: 1,
            symbol: "BTCUSD".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: "1".parse().unwrap(),
            price: None,
            stop_price: None,
        };
        assert!(matches!(request.into_core(), Err(AppError::BadRequest(_))));
    }
}
