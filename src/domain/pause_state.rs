//! Append-only pause/resume history (§3 `PauseState`, §6 `pause_states`
//! table). Distinct from `CycleState::pause_reason`, which only answers
//! "why are we paused right now" — this is the full audit trail across
//! every pause episode the engine has ever entered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PauseState {
    pub id: Uuid,
    pub reason: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub resumed_at: Option<DateTime<Utc>>,
}

impl PauseState {
    pub fn new(reason: impl Into<String>, detail: Option<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason: reason.into(),
            detail,
            occurred_at,
            resumed_at: None,
        }
    }
}
