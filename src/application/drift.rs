//! Drift Detector (C6): compares live exchange balances against the cycle's
//! own ledger before every order placement.

use crate::domain::cycle::CycleState;
use crate::domain::order::Balances;
use crate::domain::strategy_config::DRIFT_THRESHOLD;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Which side of the balance sheet exceeded the drift threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriftKind {
    Usdt,
    Btc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DriftOutcome {
    Ok,
    Halt {
        which: DriftKind,
        value: Decimal,
        threshold: Decimal,
    },
}

/// `drift_usdt = |USDT_spot - capital_available_usdt| / max(capital_available_usdt, 1)`
/// `drift_btc  = |BTC_spot - btc_accumulated| / max(btc_accumulated, 1e-8)`
///
/// Checks USDT first so a simultaneous breach reports the USDT halt, an
/// arbitrary but deterministic tie-break.
pub fn check_drift(balances: &Balances, state: &CycleState) -> DriftOutcome {
    let usdt_denom = state.capital_available_usdt.max(Decimal::ONE);
    let drift_usdt = (balances.usdt - state.capital_available_usdt).abs() / usdt_denom;
    if drift_usdt > DRIFT_THRESHOLD {
        return DriftOutcome::Halt {
            which: DriftKind::Usdt,
            value: drift_usdt,
            threshold: DRIFT_THRESHOLD,
        };
    }

    let btc_denom = state.btc_accumulated.max(dec!(0.00000001));
    let drift_btc = (balances.btc - state.btc_accumulated).abs() / btc_denom;
    if drift_btc > DRIFT_THRESHOLD {
        return DriftOutcome::Halt {
            which: DriftKind::Btc,
            value: drift_btc,
            threshold: DRIFT_THRESHOLD,
        };
    }

    DriftOutcome::Ok
}
