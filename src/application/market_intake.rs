//! Market Data Intake (C2): the rolling closed-candle window, dedup-by-
//! `open_time`, and validation. The reconnect/backfill wire plumbing lives
//! in `infrastructure::binance::websocket`; this module is the pure
//! bookkeeping the Supervisor drives it through.

use crate::domain::candle::{Candle, CandleValidationError};
use crate::domain::strategy_config::ATH_WINDOW;
use std::collections::VecDeque;

/// Outcome of offering a candle to the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeOutcome {
    Accepted,
    /// Already seen this `open_time`; silently discarded (§4.2).
    Duplicate,
}

/// Rolling buffer of the last `ATH_WINDOW` closed candles plus the
/// out-of-order/duplicate guard on `open_time` (§4.2, §4.3).
pub struct CandleWindow {
    capacity: usize,
    buffer: VecDeque<Candle>,
    last_open_time: Option<i64>,
}

impl CandleWindow {
    pub fn new() -> Self {
        Self {
            capacity: ATH_WINDOW,
            buffer: VecDeque::with_capacity(ATH_WINDOW),
            last_open_time: None,
        }
    }

    /// Validates, dedups, and (if accepted) inserts `candle`, evicting the
    /// oldest entry once the window is at capacity. Only `closed` candles
    /// should be offered here; the caller (intake adapter) filters those
    /// before calling in.
    pub fn accept(&mut self, candle: Candle) -> Result<IntakeOutcome, CandleValidationError> {
        candle.validate()?;

        if let Some(last) = self.last_open_time
            && candle.open_time == last
        {
            return Ok(IntakeOutcome::Duplicate);
        }
        candle.validate_order(self.last_open_time)?;

        self.last_open_time = Some(candle.open_time);
        if self.buffer.len() == self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(candle);
        Ok(IntakeOutcome::Accepted)
    }

    /// The window's contents, oldest first. Fed directly to
    /// `reference_price::compute_ath`.
    pub fn window(&self) -> Vec<Candle> {
        self.buffer.iter().copied().collect()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.capacity
    }
}

impl Default for CandleWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open_time: i64) -> Candle {
        Candle {
            open_time,
            close_time: open_time + 1,
            open: dec!(100),
            high: dec!(110),
            low: dec!(90),
            close: dec!(105),
            closed: true,
        }
    }

    #[test]
    fn accepts_in_order_candles() {
        let mut w = CandleWindow::new();
        assert_eq!(w.accept(candle(1)).unwrap(), IntakeOutcome::Accepted);
        assert_eq!(w.accept(candle(2)).unwrap(), IntakeOutcome::Accepted);
        assert_eq!(w.window().len(), 2);
    }

    #[test]
    fn discards_duplicate_open_time() {
        let mut w = CandleWindow::new();
        w.accept(candle(1)).unwrap();
        assert_eq!(w.accept(candle(1)).unwrap(), IntakeOutcome::Duplicate);
        assert_eq!(w.window().len(), 1);
    }

    #[test]
    fn rejects_out_of_order_open_time() {
        let mut w = CandleWindow::new();
        w.accept(candle(5)).unwrap();
        assert!(matches!(
            w.accept(candle(3)),
            Err(CandleValidationError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let mut w = CandleWindow::new();
        for i in 1..=(ATH_WINDOW as i64 + 5) {
            w.accept(candle(i)).unwrap();
        }
        assert_eq!(w.window().len(), ATH_WINDOW);
        assert_eq!(w.window().first().unwrap().open_time, 6);
        assert!(w.is_full());
    }

    #[test]
    fn rejects_malformed_candle_without_advancing_last_open_time() {
        let mut w = CandleWindow::new();
        let mut bad = candle(1);
        bad.high = dec!(0);
        assert!(w.accept(bad).is_err());
        // A well-formed candle at the same open_time after a rejected
        // malformed one is still in-order, since the bad candle never
        // advanced last_open_time.
        assert_eq!(w.accept(candle(1)).unwrap(), IntakeOutcome::Accepted);
    }
}
