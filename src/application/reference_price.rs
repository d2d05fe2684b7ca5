//! ATH and weighted reference-price computation (C3).

use crate::domain::candle::Candle;
use crate::domain::cycle::CycleState;
use crate::domain::decimal::checked_div;
use rust_decimal::Decimal;

/// Maximum `high` across the rolling candle window (§4.3). `window` is
/// expected to already be limited to the last `ATH_WINDOW` closed candles;
/// this function does not itself truncate it.
///
/// Returns `None` if `window` is empty, the caller's signal that the window
/// has not been seeded yet.
pub fn compute_ath(window: &[Candle]) -> Option<Decimal> {
    window.iter().map(|c| c.high).max()
}

/// The reference price while flat (§4.3): always the current ATH.
pub fn reference_when_flat(state: &CycleState) -> Decimal {
    state.ath_price
}

/// The reference price while holding (§4.3): weighted average cost net of
/// base-denominated fees. `checked_div` surfaces division-by-zero rather
/// than panicking; callers fall back to ATH if it occurs, which in practice
/// only happens for a HOLDING state with `btc_accum_net == 0`, a state the
/// invariant checker rejects before it can be persisted.
pub fn reference_when_holding(state: &CycleState) -> Result<Decimal, crate::domain::decimal::DecimalError> {
    checked_div(state.cost_accum_usdt, state.btc_accum_net)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy_config::StrategyConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn candle(high: Decimal) -> Candle {
        Candle {
            open_time: 0,
            close_time: 1,
            open: high,
            high,
            low: high,
            close: high,
            closed: true,
        }
    }

    #[test]
    fn ath_is_max_high_over_window() {
        let window = vec![candle(dec!(100)), candle(dec!(150)), candle(dec!(120))];
        assert_eq!(compute_ath(&window), Some(dec!(150)));
    }

    #[test]
    fn ath_is_none_for_empty_window() {
        assert_eq!(compute_ath(&[]), None);
    }

    #[test]
    fn reference_when_flat_returns_ath() {
        let cfg = StrategyConfig {
            timeframe: "4h".into(),
            drop_pct: dec!(0.05),
            rise_pct: dec!(0.05),
            max_purchases: 3,
            min_buy_usdt: dec!(10),
            initial_capital_usdt: dec!(300),
            slippage_buy_pct: dec!(0.003),
            slippage_sell_pct: dec!(0.003),
            is_active: true,
        };
        let mut state = CycleState::new_ready(&cfg, Utc::now());
        state.ath_price = dec!(50000);
        assert_eq!(reference_when_flat(&state), dec!(50000));
    }

    #[test]
    fn reference_when_holding_divides_cost_by_net_btc() {
        let cfg = StrategyConfig {
            timeframe: "4h".into(),
            drop_pct: dec!(0.05),
            rise_pct: dec!(0.05),
            max_purchases: 3,
            min_buy_usdt: dec!(10),
            initial_capital_usdt: dec!(300),
            slippage_buy_pct: dec!(0.003),
            slippage_sell_pct: dec!(0.003),
            is_active: true,
        };
        let mut state = CycleState::new_ready(&cfg, Utc::now());
        state.cost_accum_usdt = dec!(100.10);
        state.btc_accum_net = dec!(0.002099);
        let expected = dec!(100.10) / dec!(0.002099);
        assert_eq!(reference_when_holding(&state).unwrap(), expected);
    }

    #[test]
    fn reference_when_holding_surfaces_division_by_zero() {
        let cfg = StrategyConfig {
            timeframe: "4h".into(),
            drop_pct: dec!(0.05),
            rise_pct: dec!(0.05),
            max_purchases: 3,
            min_buy_usdt: dec!(10),
            initial_capital_usdt: dec!(300),
            slippage_buy_pct: dec!(0.003),
            slippage_sell_pct: dec!(0.003),
            is_active: true,
        };
        let state = CycleState::new_ready(&cfg, Utc::now());
        assert!(reference_when_holding(&state).is_err());
    }
}
