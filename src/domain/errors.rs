//! Cross-cutting structured error types. Pure-logic modules (decimal,
//! candle, strategy_config, cycle) keep their own narrow `thiserror` enums
//! colocated with the type they validate; this file holds the error types
//! shared across component boundaries — persistence and the exchange client.

use crate::domain::cycle::CycleInvariantError;
use crate::domain::order::ExchangeErrorKind;
use thiserror::Error;

/// Errors returned by the Cycle State Store (C5) when a write is rejected.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("version conflict: expected v{expected}, store has v{actual}")]
    VersionConflict { expected: i64, actual: i64 },

    #[error("invariant violation: {0}")]
    InvariantViolation(#[from] CycleInvariantError),

    #[error("store I/O error: {0}")]
    Io(String),
}

/// An exchange-originated failure, tagged with its retry classification
/// (§6, §7). Produced by the `ExchangeClient` port implementation so the
/// Order Executor never has to pattern-match on transport-level details.
#[derive(Debug, Error, Clone)]
pub enum ExchangeError {
    #[error("retryable exchange error: {0}")]
    Retryable(String),

    #[error("non-retryable exchange error: {0}")]
    NonRetryable(String),

    #[error("ambiguous exchange error (timeout after send): {0}")]
    Ambiguous(String),
}

impl ExchangeError {
    pub fn kind(&self) -> ExchangeErrorKind {
        match self {
            ExchangeError::Retryable(_) => ExchangeErrorKind::Retryable,
            ExchangeError::NonRetryable(_) => ExchangeErrorKind::NonRetryable,
            ExchangeError::Ambiguous(_) => ExchangeErrorKind::Ambiguous,
        }
    }
}
