//! Error taxonomy surfaced by the exchange core

use crate::ids::OrderId;
use thiserror::Error;

/// Malformed input caught before a command reaches a symbol worker.
///
/// These are returned synchronously and never create an order record.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("quantity must be positive")]
    NonPositiveQuantity,

    #[error("limit orders require a price")]
    MissingLimitPrice,

    #[error("stop orders require a stop price")]
    MissingStopPrice,

    #[error("market orders do not carry a price")]
    UnexpectedPrice,
}

/// Cancel precondition failures. No book state changes on any of these.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelError {
    #[error("order not found: {0}")]
    NotFound(OrderId),

    #[error("order {0} does not belong to the requesting user")]
    NotOwned(OrderId),

    #[error("order {0} is already in a terminal state")]
    AlreadyTerminal(OrderId),
}

/// Top-level error type for core commands.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error(transparent)]
    Cancel(#[from] CancelError),

    /// Transient state-store failure survived the retry budget, or the
    /// symbol's worker is halted or shutting down.
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A consistency check failed mid-command. The symbol's matching loop
    /// halts; operator intervention required.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_error_display() {
        let err = CancelError::NotOwned(OrderId::new(7));
        assert_eq!(
            err.to_string(),
            "order 7 does not belong to the requesting user"
        );
    }

    #[test]
    fn test_core_error_from_validation() {
        let err: CoreError = ValidationError::MissingLimitPrice.into();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(err.to_string(), "validation failed: limit orders require a price");
    }

    #[test]
    fn test_core_error_from_cancel() {
        let err: CoreError = CancelError::AlreadyTerminal(OrderId::new(3)).into();
        assert_eq!(err.to_string(), "order 3 is already in a terminal state");
    }
}
