//! Gateway error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use types::errors::{CancelError, CoreError};

/// Central error type for the gateway surface.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => AppError::BadRequest(e.to_string()),
            CoreError::UnknownSymbol(symbol) => {
                AppError::NotFound(format!("unknown symbol: {symbol}"))
            }
            CoreError::Cancel(CancelError::NotFound(id)) => {
                AppError::NotFound(format!("order not found: {id}"))
            }
            CoreError::Cancel(CancelError::NotOwned(id)) => {
                AppError::Forbidden(format!("order {id} belongs to another user"))
            }
            CoreError::Cancel(CancelError::AlreadyTerminal(id)) => {
                AppError::Conflict(format!("order {id} is already terminal"))
            }
            CoreError::EngineUnavailable(msg) => AppError::ServiceUnavailable(msg),
            CoreError::InvariantViolation(msg) => {
                AppError::Internal(anyhow::anyhow!("invariant violation: {msg}"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT"),
            AppError::RateLimitExceeded(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, msg, "RATE_LIMIT_EXCEEDED")
            }
            AppError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, msg, "SERVICE_UNAVAILABLE")
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
                "INTERNAL_ERROR",
            ),
        };

        let body = Json(json!({
            "error": code,
            "message": message,
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::OrderId;

    #[test]
    fn test_cancel_errors_map_to_statuses() {
        let not_found: AppError = CoreError::Cancel(CancelError::NotFound(OrderId::new(1))).into();
        assert!(matches!(not_found, AppError::NotFound(_)));

        let not_owned: AppError = CoreError::Cancel(CancelError::NotOwned(OrderId::new(1))).into();
        assert!(matches!(not_owned, AppError::Forbidden(_)));

        let terminal: AppError =
            CoreError::Cancel(CancelError::AlreadyTerminal(OrderId::new(1))).into();
        assert!(matches!(terminal, AppError::Conflict(_)));
    }

    #[test]
    fn test_engine_unavailable_is_503() {
        let err: AppError = CoreError::EngineUnavailable("store down".into()).into();
        assert!(matches!(err, AppError::ServiceUnavailable(_)));
    }
}
