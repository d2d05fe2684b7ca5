//! Candlestick data type and validation (C2's data model).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub closed: bool,
}

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum CandleValidationError {
    #[error("non-positive price: open={open} high={high} low={low} close={close}")]
    NonPositivePrice {
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    },
    #[error("high ({high}) < low ({low})")]
    HighBelowLow { high: Decimal, low: Decimal },
    #[error("close_time ({close_time}) <= open_time ({open_time})")]
    CloseBeforeOpen { open_time: i64, close_time: i64 },
    #[error("candle open_time {open_time} is out of order relative to last seen open_time {last_open_time}")]
    OutOfOrder {
        open_time: i64,
        last_open_time: i64,
    },
}

impl Candle {
    /// Validates intrinsic consistency of a single candle (no ordering context).
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
        {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.high < self.low {
            return Err(CandleValidationError::HighBelowLow {
                high: self.high,
                low: self.low,
            });
        }
        if self.close_time <= self.open_time {
            return Err(CandleValidationError::CloseBeforeOpen {
                open_time: self.open_time,
                close_time: self.close_time,
            });
        }
        Ok(())
    }

    /// Validates ordering relative to the previously accepted candle's
    /// `open_time`. Intake calls this in addition to [`Candle::validate`].
    pub fn validate_order(&self, last_open_time: Option<i64>) -> Result<(), CandleValidationError> {
        if let Some(last) = last_open_time
            && self.open_time <= last
        {
            return Err(CandleValidationError::OutOfOrder {
                open_time: self.open_time,
                last_open_time: last,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_candle() -> Candle {
        Candle {
            open_time: 1_000,
            close_time: 2_000,
            open: dec!(50000),
            high: dec!(50500),
            low: dec!(49800),
            close: dec!(50200),
            closed: true,
        }
    }

    #[test]
    fn accepts_well_formed_candle() {
        assert!(valid_candle().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_prices() {
        let mut c = valid_candle();
        c.low = dec!(0);
        assert!(matches!(
            c.validate(),
            Err(CandleValidationError::NonPositivePrice { .. })
        ));
    }

    #[test]
    fn rejects_high_below_low() {
        let mut c = valid_candle();
        c.high = dec!(100);
        c.low = dec!(200);
        assert!(matches!(
            c.validate(),
            Err(CandleValidationError::HighBelowLow { .. })
        ));
    }

    #[test]
    fn rejects_close_time_not_after_open_time() {
        let mut c = valid_candle();
        c.close_time = c.open_time;
        assert!(matches!(
            c.validate(),
            Err(CandleValidationError::CloseBeforeOpen { .. })
        ));
    }

    #[test]
    fn rejects_out_of_order_open_time() {
        let c = valid_candle();
        assert!(c.validate_order(Some(1_000)).is_err());
        assert!(c.validate_order(Some(999)).is_ok());
        assert!(c.validate_order(None).is_ok());
    }
}
