//! Exact decimal arithmetic for monetary and quantity values.
//!
//! Every price, quantity, and balance in the engine is a [`rust_decimal::Decimal`].
//! Binary floating point never touches these paths. This module provides the two
//! exchange-bound rounding operations the rest of the engine calls by name
//! (`round_to_tick_up`, `round_to_tick_down`, `round_to_step_down`) plus a
//! banker's-rounding helper for intermediate computation such as the weighted
//! reference price.

use rust_decimal::{Decimal, RoundingStrategy};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum DecimalError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("rounding unit must be positive, got {0}")]
    NonPositiveUnit(Decimal),
}

/// Divides `numerator / denominator`, returning `DecimalError::DivisionByZero`
/// instead of panicking or producing a poisoned value.
pub fn checked_div(numerator: Decimal, denominator: Decimal) -> Result<Decimal, DecimalError> {
    if denominator.is_zero() {
        return Err(DecimalError::DivisionByZero);
    }
    Ok(numerator / denominator)
}

/// Floors `value` to the nearest multiple of `unit` (e.g. tick or step size).
///
/// `unit` must be strictly positive. Used for sell limit prices and for
/// quantities derived from a price (both buy and sell sizes round down so the
/// engine never over-commits capital or oversells base asset).
pub fn floor_to_multiple(value: Decimal, unit: Decimal) -> Result<Decimal, DecimalError> {
    if unit <= Decimal::ZERO {
        return Err(DecimalError::NonPositiveUnit(unit));
    }
    let steps = (value / unit).trunc();
    // `trunc` rounds toward zero; for non-negative values that is a floor.
    // Exchange-bound values here are always non-negative, but guard anyway.
    let floored = if value.is_sign_negative() && steps * unit != value {
        steps - Decimal::ONE
    } else {
        steps
    };
    Ok(floored * unit)
}

/// Ceils `value` to the nearest multiple of `unit`. Used for buy limit prices
/// so the order is never submitted below the intended slippage-adjusted price.
pub fn ceil_to_multiple(value: Decimal, unit: Decimal) -> Result<Decimal, DecimalError> {
    if unit <= Decimal::ZERO {
        return Err(DecimalError::NonPositiveUnit(unit));
    }
    let floored = floor_to_multiple(value, unit)?;
    if floored == value {
        Ok(floored)
    } else {
        Ok(floored + unit)
    }
}

/// Ceiling-to-tick for a buy limit price: `round_to_tick_up` in spec terms.
pub fn round_to_tick_up(price: Decimal, tick: Decimal) -> Result<Decimal, DecimalError> {
    ceil_to_multiple(price, tick)
}

/// Floor-to-tick for a sell limit price: `round_to_tick_down` in spec terms.
pub fn round_to_tick_down(price: Decimal, tick: Decimal) -> Result<Decimal, DecimalError> {
    floor_to_multiple(price, tick)
}

/// Floor-to-step for an order quantity: `round_to_step_down` in spec terms.
/// Used for both buy and sell quantities.
pub fn round_to_step_down(quantity: Decimal, step: Decimal) -> Result<Decimal, DecimalError> {
    floor_to_multiple(quantity, step)
}

/// Banker's rounding (round-half-to-even) to `scale` decimal places, the
/// default rounding mode for intermediate monetary computation.
pub fn round_bankers(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointNearestEven)
}

/// True if `value` is smaller than one `step` unit — the "dust epsilon" used
/// to decide whether a cycle has been fully sold.
pub fn is_dust(value: Decimal, step: Decimal) -> bool {
    value < step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn floor_to_multiple_rounds_down() {
        assert_eq!(
            floor_to_multiple(dec!(47689.37), dec!(0.01)).unwrap(),
            dec!(47689.37)
        );
        assert_eq!(
            floor_to_multiple(dec!(47689.376), dec!(0.01)).unwrap(),
            dec!(47689.37)
        );
        assert_eq!(
            floor_to_multiple(dec!(0.0020999), dec!(0.00001)).unwrap(),
            dec!(0.00209)
        );
    }

    #[test]
    fn ceil_to_multiple_rounds_up() {
        assert_eq!(
            ceil_to_multiple(dec!(47642.501), dec!(0.01)).unwrap(),
            dec!(47642.51)
        );
        assert_eq!(
            ceil_to_multiple(dec!(47642.50), dec!(0.01)).unwrap(),
            dec!(47642.50)
        );
    }

    #[test]
    fn rejects_non_positive_unit() {
        assert_eq!(
            floor_to_multiple(dec!(1), dec!(0)),
            Err(DecimalError::NonPositiveUnit(dec!(0)))
        );
        assert_eq!(
            ceil_to_multiple(dec!(1), dec!(-1)),
            Err(DecimalError::NonPositiveUnit(dec!(-1)))
        );
    }

    #[test]
    fn checked_div_rejects_zero_denominator() {
        assert_eq!(
            checked_div(dec!(100), dec!(0)),
            Err(DecimalError::DivisionByZero)
        );
        assert_eq!(checked_div(dec!(100), dec!(4)).unwrap(), dec!(25));
    }

    #[test]
    fn bankers_rounding_rounds_half_to_even() {
        assert_eq!(round_bankers(dec!(2.5), 0), dec!(2));
        assert_eq!(round_bankers(dec!(3.5), 0), dec!(4));
        assert_eq!(round_bankers(dec!(0.125), 2), dec!(0.12));
    }

    #[test]
    fn dust_epsilon_boundary() {
        let step = dec!(0.00001);
        assert!(is_dust(dec!(0.000009), step));
        assert!(!is_dust(dec!(0.00001), step));
        assert!(!is_dust(dec!(0.00002), step));
    }
}
