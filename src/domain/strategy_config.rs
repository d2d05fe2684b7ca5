//! Validated, immutable strategy configuration (C4).
//!
//! Loaded once from the persistent store at startup and treated as an
//! immutable snapshot for the lifetime of the process — changing a parameter
//! requires a restart, not a hot-reload path.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rolling window size used by the ATH calculator. Not configurable.
pub const ATH_WINDOW: usize = 20;
/// Relative drift threshold that triggers a safety pause. Not configurable.
pub const DRIFT_THRESHOLD: Decimal = dec!(0.005);
/// Number of non-retryable exchange errors within the rolling window that
/// triggers a pause. Not configurable.
pub const NON_RETRYABLE_ERROR_PAUSE_THRESHOLD: usize = 3;
/// Maximum Order Executor submission attempts (initial + retries). Not configurable.
pub const ORDER_SUBMIT_MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StrategyConfigError {
    #[error("timeframe must be non-empty")]
    EmptyTimeframe,
    #[error("drop_pct must be in [0.02, 0.08], got {0}")]
    DropPctOutOfRange(Decimal),
    #[error("rise_pct must be in [0.02, 0.08], got {0}")]
    RisePctOutOfRange(Decimal),
    #[error("max_purchases must be in [1, 30], got {0}")]
    MaxPurchasesOutOfRange(i32),
    #[error("min_buy_usdt must be >= 10.00, got {0}")]
    MinBuyTooSmall(Decimal),
    #[error("initial_capital_usdt must be > 0, got {0}")]
    InitialCapitalNotPositive(Decimal),
    #[error("slippage_buy_pct must be in [0, 0.1], got {0}")]
    SlippageBuyOutOfRange(Decimal),
    #[error("slippage_sell_pct must be in [0, 0.1], got {0}")]
    SlippageSellOutOfRange(Decimal),
}

/// Immutable, validated strategy parameters (§3 `StrategyConfig`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub timeframe: String,
    pub drop_pct: Decimal,
    pub rise_pct: Decimal,
    pub max_purchases: i32,
    pub min_buy_usdt: Decimal,
    pub initial_capital_usdt: Decimal,
    pub slippage_buy_pct: Decimal,
    pub slippage_sell_pct: Decimal,
    pub is_active: bool,
}

impl StrategyConfig {
    /// Validates bounds in §3. Construction always goes through this path —
    /// there is no unchecked constructor, so a `StrategyConfig` value is a
    /// proof that it satisfied its invariants at load time.
    pub fn validated(self) -> Result<Self, StrategyConfigError> {
        if self.timeframe.trim().is_empty() {
            return Err(StrategyConfigError::EmptyTimeframe);
        }
        if self.drop_pct < dec!(0.02) || self.drop_pct > dec!(0.08) {
            return Err(StrategyConfigError::DropPctOutOfRange(self.drop_pct));
        }
        if self.rise_pct < dec!(0.02) || self.rise_pct > dec!(0.08) {
            return Err(StrategyConfigError::RisePctOutOfRange(self.rise_pct));
        }
        if !(1..=30).contains(&self.max_purchases) {
            return Err(StrategyConfigError::MaxPurchasesOutOfRange(
                self.max_purchases,
            ));
        }
        if self.min_buy_usdt < dec!(10.00) {
            return Err(StrategyConfigError::MinBuyTooSmall(self.min_buy_usdt));
        }
        if self.initial_capital_usdt <= Decimal::ZERO {
            return Err(StrategyConfigError::InitialCapitalNotPositive(
                self.initial_capital_usdt,
            ));
        }
        if self.slippage_buy_pct < Decimal::ZERO || self.slippage_buy_pct > dec!(0.1) {
            return Err(StrategyConfigError::SlippageBuyOutOfRange(
                self.slippage_buy_pct,
            ));
        }
        if self.slippage_sell_pct < Decimal::ZERO || self.slippage_sell_pct > dec!(0.1) {
            return Err(StrategyConfigError::SlippageSellOutOfRange(
                self.slippage_sell_pct,
            ));
        }
        Ok(self)
    }

    /// The default config written on first startup: inactive until an
    /// operator reviews and flips `is_active`.
    pub fn default_inactive(initial_capital_usdt: Decimal) -> Self {
        Self {
            timeframe: "4h".to_string(),
            drop_pct: dec!(0.05),
            rise_pct: dec!(0.05),
            max_purchases: 10,
            min_buy_usdt: dec!(10.00),
            initial_capital_usdt,
            slippage_buy_pct: dec!(0.003),
            slippage_sell_pct: dec!(0.003),
            is_active: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> StrategyConfig {
        StrategyConfig {
            timeframe: "4h".to_string(),
            drop_pct: dec!(0.05),
            rise_pct: dec!(0.05),
            max_purchases: 3,
            min_buy_usdt: dec!(10.00),
            initial_capital_usdt: dec!(300),
            slippage_buy_pct: dec!(0.003),
            slippage_sell_pct: dec!(0.003),
            is_active: true,
        }
    }

    #[test]
    fn accepts_valid_config() {
        assert!(base().validated().is_ok());
    }

    #[test]
    fn rejects_drop_pct_out_of_range() {
        let mut c = base();
        c.drop_pct = dec!(0.01);
        assert_eq!(
            c.validated().unwrap_err(),
            StrategyConfigError::DropPctOutOfRange(dec!(0.01))
        );
    }

    #[test]
    fn rejects_max_purchases_out_of_range() {
        let mut c = base();
        c.max_purchases = 0;
        assert!(c.validated().is_err());
        let mut c = base();
        c.max_purchases = 31;
        assert!(c.validated().is_err());
    }

    #[test]
    fn rejects_min_buy_below_floor() {
        let mut c = base();
        c.min_buy_usdt = dec!(9.99);
        assert!(c.validated().is_err());
    }

    #[test]
    fn rejects_non_positive_initial_capital() {
        let mut c = base();
        c.initial_capital_usdt = dec!(0);
        assert!(c.validated().is_err());
    }

    #[test]
    fn rejects_slippage_out_of_range() {
        let mut c = base();
        c.slippage_buy_pct = dec!(0.2);
        assert!(c.validated().is_err());
        let mut c = base();
        c.slippage_sell_pct = dec!(-0.01);
        assert!(c.validated().is_err());
    }

    #[test]
    fn rejects_empty_timeframe() {
        let mut c = base();
        c.timeframe = "  ".to_string();
        assert_eq!(c.validated().unwrap_err(), StrategyConfigError::EmptyTimeframe);
    }

    #[test]
    fn default_inactive_is_not_active() {
        let c = StrategyConfig::default_inactive(dec!(500));
        assert!(!c.is_active);
        assert!(c.validated().is_ok());
    }
}
