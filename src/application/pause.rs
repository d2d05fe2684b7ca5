//! Pause/Resume Mechanism (C10): the non-retryable-error window counter and
//! the resume validation pass. Actually writing `status = PAUSED` into the
//! cycle row is the Cycle Controller's job (it owns the only mutation path
//! into `CycleState`); this module supplies the policy decisions it acts on.

use crate::domain::cycle::{CycleState, CycleStatus, PauseReason};
use crate::domain::order::Balances;
use crate::domain::strategy_config::NON_RETRYABLE_ERROR_PAUSE_THRESHOLD;
use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Ring-buffer-backed counter of non-retryable exchange errors within a
/// rolling time window (§4.10's "≥3 non-retryable errors within a
/// configured window"), pruned on each check rather than on a fixed
/// consecutive-count basis.
pub struct ErrorWindow {
    window: Duration,
    timestamps: VecDeque<DateTime<Utc>>,
}

impl ErrorWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(&front) = self.timestamps.front() {
            if now - front > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a non-retryable error and returns `true` if the count within
    /// the window has reached the pause threshold.
    pub fn record(&mut self, now: DateTime<Utc>) -> bool {
        self.prune(now);
        self.timestamps.push_back(now);
        self.timestamps.len() >= NON_RETRYABLE_ERROR_PAUSE_THRESHOLD
    }

    pub fn count(&mut self, now: DateTime<Utc>) -> usize {
        self.prune(now);
        self.timestamps.len()
    }
}

/// Reasons that lead the Cycle Controller to pause (§4.10). `occurred_at`
/// is supplied by the caller via an injected clock, matching the domain's
/// dependency-injected-time design note.
pub fn pause_reason(kind: &str, detail: Option<String>, now: DateTime<Utc>) -> PauseReason {
    PauseReason {
        reason: kind.to_string(),
        detail,
        occurred_at: now,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeRejection {
    DriftStillExceedsThreshold,
    ExchangeUnreachable,
    InvariantsStillViolated(String),
}

/// Resume validation (§4.10): balance drift within threshold, exchange
/// reachable, and last persisted state invariants hold. `exchange_reachable`
/// is supplied by the caller (a prior ping), since this module has no I/O
/// of its own.
pub fn validate_resume(
    state: &CycleState,
    balances: &Balances,
    exchange_reachable: bool,
    config: &crate::domain::strategy_config::StrategyConfig,
) -> Result<CycleStatus, ResumeRejection> {
    if !exchange_reachable {
        return Err(ResumeRejection::ExchangeUnreachable);
    }

    if let crate::application::drift::DriftOutcome::Halt { .. } =
        crate::application::drift::check_drift(balances, state)
    {
        return Err(ResumeRejection::DriftStillExceedsThreshold);
    }

    let mut candidate = state.clone();
    candidate.status = if candidate.btc_accumulated.is_zero() {
        CycleStatus::Ready
    } else {
        CycleStatus::Holding
    };
    crate::domain::cycle::check_invariants(&candidate, config)
        .map_err(|e| ResumeRejection::InvariantsStillViolated(e.to_string()))?;

    Ok(candidate.status)
}
