//! Trigger Evaluator (C8): decides sell-or-buy-or-nothing from a single
//! closed candle, the current cycle state, and the active config. Pure
//! function, no I/O, no mutation — the Cycle Controller (C9) is the only
//! thing that acts on the decision.

use crate::domain::candle::Candle;
use crate::domain::cycle::{CycleState, CycleStatus};
use crate::domain::strategy_config::StrategyConfig;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    None,
    Sell { qty: Decimal },
    Buy { usdt: Decimal },
}

/// Whether the ATH window has enough history to allow buys (§4.9 tie-break:
/// "if fewer than 20 candles are available after startup, buys are blocked").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowReadiness {
    pub buys_allowed: bool,
}

/// Sell leg of §4.8: `btc_accumulated > 0 AND close >= reference_price * (1 + rise_pct)`.
/// Returns the quantity to sell (always the full holding) or `None`.
/// Exposed separately from [`evaluate`] because the Cycle Controller (C9)
/// must re-evaluate the buy condition against the *post-reset* state when a
/// sell fully closes the cycle within the same tick (§4.9 tie-break).
pub fn sell_decision(candle: &Candle, state: &CycleState, config: &StrategyConfig) -> Option<Decimal> {
    if !config.is_active || state.status == CycleStatus::Paused {
        return None;
    }
    if state.btc_accumulated <= Decimal::ZERO {
        return None;
    }
    let sell_threshold = state.reference_price * (Decimal::ONE + config.rise_pct);
    if candle.close >= sell_threshold {
        Some(state.btc_accumulated)
    } else {
        None
    }
}

/// Buy leg of §4.8. `window.buys_allowed` gates on ATH-window fill (fewer
/// than 20 candles blocks buys entirely, §4.9 tie-break). `min_notional` is
/// the exchange-rule floor for the traded symbol; the effective floor below
/// which a buy is skipped is `max(config.min_buy_usdt, min_notional)`.
pub fn buy_decision(
    candle: &Candle,
    state: &CycleState,
    config: &StrategyConfig,
    window: WindowReadiness,
    min_notional: Decimal,
) -> Option<Decimal> {
    if !config.is_active || state.status == CycleStatus::Paused || !window.buys_allowed {
        return None;
    }
    if state.purchases_remaining <= 0 {
        return None;
    }
    let buy_threshold = state.reference_price * (Decimal::ONE - config.drop_pct);
    if candle.close > buy_threshold {
        return None;
    }
    let floor = config.min_buy_usdt.max(min_notional);
    let amount = if state.purchases_remaining == 1 && state.capital_available_usdt >= floor {
        state.capital_available_usdt
    } else {
        state.buy_amount_usdt
    };
    if amount >= floor {
        Some(amount)
    } else {
        None
    }
}

/// Evaluates sell first, then buy, against `candle` (§4.8). `state` must
/// already have `reference_price` set for the current tick (the Cycle
/// Controller refreshes it before calling this). Returns `Decision::None`
/// if the config is inactive, if the cycle is PAUSED, or if neither
/// condition fires.
///
/// This is a single-shot convenience over [`sell_decision`]/[`buy_decision`]
/// for callers that only need one candle's decision against one state
/// snapshot, not the multi-step within-tick re-evaluation C9 performs.
pub fn evaluate(
    candle: &Candle,
    state: &CycleState,
    config: &StrategyConfig,
    window: WindowReadiness,
    min_notional: Decimal,
) -> Decision {
    if let Some(qty) = sell_decision(candle, state, config) {
        return Decision::Sell { qty };
    }
    match buy_decision(candle, state, config, window, min_notional) {
        Some(usdt) => Decision::Buy { usdt },
        None => Decision::None,
    }
}
