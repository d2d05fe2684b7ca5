//! The durable cycle record (§3 `CycleState`) and its invariants (§3, checked
//! on every persisted transition by the Cycle State Store, C5).

use crate::domain::order::OrderSide;
use crate::domain::strategy_config::StrategyConfig;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Tolerance for the `reference_price == cost_accum_usdt / btc_accum_net`
/// invariant, to absorb accumulated rounding in the Decimal path.
pub const REFERENCE_PRICE_TOLERANCE: Decimal = dec!(0.00000001);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStatus {
    Ready,
    Holding,
    Paused,
}

/// The write-ahead marker persisted before the Order Executor contacts the
/// exchange (§4.5). Its presence on disk across a restart is what lets the
/// Supervisor detect an intended-but-unconfirmed order and reconcile it via
/// `get_order(client_order_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteAheadIntent {
    pub client_order_id: Uuid,
    pub side: OrderSide,
    pub created_at: DateTime<Utc>,
}

/// A single pause episode, embedded in the cycle row at the moment of
/// pausing. The append-only history of all pause episodes lives in the
/// `pause_states` table (§6); this is only "why are we paused right now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseReason {
    pub reason: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleState {
    pub cycle_id: Uuid,
    pub status: CycleStatus,
    pub capital_available_usdt: Decimal,
    pub btc_accumulated: Decimal,
    pub purchases_remaining: i32,
    /// Purchase slots consumed so far in the current cycle. Kept alongside
    /// `purchases_remaining` (rather than derived) so invariant 3 is a
    /// structural check of the row, catching a controller bug that
    /// decremented one field without the other.
    pub purchases_executed: i32,
    pub reference_price: Decimal,
    pub cost_accum_usdt: Decimal,
    pub btc_accum_net: Decimal,
    pub ath_price: Decimal,
    pub buy_amount_usdt: Decimal,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub pending_intent: Option<WriteAheadIntent>,
    pub pause_reason: Option<PauseReason>,
}

impl CycleState {
    /// The initial READY cycle created by the store on first `load()` (§4.5).
    pub fn new_ready(config: &StrategyConfig, now: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            status: CycleStatus::Ready,
            capital_available_usdt: config.initial_capital_usdt,
            btc_accumulated: Decimal::ZERO,
            purchases_remaining: config.max_purchases,
            purchases_executed: 0,
            reference_price: Decimal::ZERO,
            cost_accum_usdt: Decimal::ZERO,
            btc_accum_net: Decimal::ZERO,
            ath_price: Decimal::ZERO,
            buy_amount_usdt: config.initial_capital_usdt / Decimal::from(config.max_purchases),
            updated_at: now,
            version: 0,
            pending_intent: None,
            pause_reason: None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CycleInvariantError {
    #[error("READY cycle must hold zero btc_accumulated, got {0}")]
    ReadyNotFlat(Decimal),
    #[error(
        "READY cycle must have purchases_remaining == max_purchases ({max}), got {actual}"
    )]
    ReadyPurchasesNotReset { actual: i32, max: i32 },
    #[error("READY cycle must have reference_price == ath_price ({ath}), got {reference}")]
    ReadyReferenceNotAth { reference: Decimal, ath: Decimal },
    #[error("HOLDING cycle must have btc_accumulated > 0, got {0}")]
    HoldingNotPositiveBtc(Decimal),
    #[error("HOLDING cycle must have btc_accum_net > 0, got {0}")]
    HoldingNetNotPositive(Decimal),
    #[error(
        "HOLDING reference_price {actual} does not match cost_accum_usdt/btc_accum_net {expected} within tolerance"
    )]
    HoldingReferenceMismatch { actual: Decimal, expected: Decimal },
    #[error("purchases_remaining ({remaining}) + purchases_executed ({executed}) != max_purchases ({max})")]
    PurchasesCountMismatch {
        remaining: i32,
        executed: i32,
        max: i32,
    },
    #[error("capital_available_usdt went negative: {0}")]
    NegativeCapital(Decimal),
    #[error("purchases_remaining ({0}) out of range [0, max_purchases]")]
    PurchasesRemainingOutOfRange(i32),
}

/// Checks §3's invariants against a candidate state before the Cycle State
/// Store commits it.
pub fn check_invariants(
    state: &CycleState,
    config: &StrategyConfig,
) -> Result<(), CycleInvariantError> {
    if state.capital_available_usdt < Decimal::ZERO {
        return Err(CycleInvariantError::NegativeCapital(
            state.capital_available_usdt,
        ));
    }
    if !(0..=config.max_purchases).contains(&state.purchases_remaining) {
        return Err(CycleInvariantError::PurchasesRemainingOutOfRange(
            state.purchases_remaining,
        ));
    }
    if state.purchases_remaining + state.purchases_executed != config.max_purchases {
        return Err(CycleInvariantError::PurchasesCountMismatch {
            remaining: state.purchases_remaining,
            executed: state.purchases_executed,
            max: config.max_purchases,
        });
    }

    match state.status {
        CycleStatus::Ready => {
            if state.btc_accumulated != Decimal::ZERO {
                return Err(CycleInvariantError::ReadyNotFlat(state.btc_accumulated));
            }
            if state.purchases_remaining != config.max_purchases {
                return Err(CycleInvariantError::ReadyPurchasesNotReset {
                    actual: state.purchases_remaining,
                    max: config.max_purchases,
                });
            }
            if state.reference_price != state.ath_price {
                return Err(CycleInvariantError::ReadyReferenceNotAth {
                    reference: state.reference_price,
                    ath: state.ath_price,
                });
            }
        }
        CycleStatus::Holding => {
            if state.btc_accumulated <= Decimal::ZERO {
                return Err(CycleInvariantError::HoldingNotPositiveBtc(
                    state.btc_accumulated,
                ));
            }
            if state.btc_accum_net <= Decimal::ZERO {
                return Err(CycleInvariantError::HoldingNetNotPositive(
                    state.btc_accum_net,
                ));
            }
            let expected = state.cost_accum_usdt / state.btc_accum_net;
            if (state.reference_price - expected).abs() > REFERENCE_PRICE_TOLERANCE {
                return Err(CycleInvariantError::HoldingReferenceMismatch {
                    actual: state.reference_price,
                    expected,
                });
            }
        }
        CycleStatus::Paused => {
            // PAUSED carries whatever numeric state it was paused with; no
            // additional shape constraint beyond the checks already run above.
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> StrategyConfig {
        StrategyConfig {
            timeframe: "4h".into(),
            drop_pct: dec!(0.05),
            rise_pct: dec!(0.05),
            max_purchases: 3,
            min_buy_usdt: dec!(10),
            initial_capital_usdt: dec!(300),
            slippage_buy_pct: dec!(0.003),
            slippage_sell_pct: dec!(0.003),
            is_active: true,
        }
    }

    #[test]
    fn fresh_ready_cycle_satisfies_invariants() {
        let cfg = config();
        let state = CycleState::new_ready(&cfg, Utc::now());
        assert!(check_invariants(&state, &cfg).is_ok());
    }

    #[test]
    fn ready_with_nonzero_btc_is_rejected() {
        let cfg = config();
        let mut state = CycleState::new_ready(&cfg, Utc::now());
        state.btc_accumulated = dec!(0.001);
        assert_eq!(
            check_invariants(&state, &cfg).unwrap_err(),
            CycleInvariantError::ReadyNotFlat(dec!(0.001))
        );
    }

    #[test]
    fn holding_requires_matching_reference_price() {
        let cfg = config();
        let mut state = CycleState::new_ready(&cfg, Utc::now());
        state.status = CycleStatus::Holding;
        state.btc_accumulated = dec!(0.002099);
        state.btc_accum_net = dec!(0.002099);
        state.cost_accum_usdt = dec!(100.10);
        state.purchases_remaining = 2;
        state.purchases_executed = 1;
        state.reference_price = dec!(100.10) / dec!(0.002099);
        assert!(check_invariants(&state, &cfg).is_ok());

        state.reference_price = dec!(999);
        assert!(matches!(
            check_invariants(&state, &cfg),
            Err(CycleInvariantError::HoldingReferenceMismatch { .. })
        ));
    }

    #[test]
    fn negative_capital_is_rejected() {
        let cfg = config();
        let mut state = CycleState::new_ready(&cfg, Utc::now());
        state.capital_available_usdt = dec!(-1);
        assert_eq!(
            check_invariants(&state, &cfg).unwrap_err(),
            CycleInvariantError::NegativeCapital(dec!(-1))
        );
    }

    #[test]
    fn purchases_count_mismatch_is_rejected() {
        let cfg = config();
        let mut state = CycleState::new_ready(&cfg, Utc::now());
        // purchases_remaining=3, purchases_executed=1: does not sum to max_purchases=3
        state.purchases_executed = 1;
        assert!(matches!(
            check_invariants(&state, &cfg),
            Err(CycleInvariantError::PurchasesCountMismatch { .. })
        ));
    }
}
