//! Port traits the application layer programs against (§5, §6). Every
//! adapter lives under `infrastructure`; nothing here knows about Binance,
//! SQLite, or HTTP.

use crate::domain::candle::Candle;
use crate::domain::cycle::CycleState;
use crate::domain::errors::{ExchangeError, PersistenceError};
use crate::domain::events::Event;
use crate::domain::order::{Balances, ExchangeRules, OrderOutcome, OrderRequest};
use crate::domain::pause_state::PauseState;
use crate::domain::strategy_config::StrategyConfig;
use crate::domain::trade::TradeRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// Live candle stream plus the historical backfill needed to seed the ATH
/// window on startup (C2).
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Subscribes to closed-candle events for `symbol`/`timeframe`. The
    /// returned channel only ever carries candles with `closed == true`;
    /// in-progress candle updates are filtered by the adapter, not the
    /// caller (§4.2).
    async fn subscribe_candles(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Receiver<Candle>, ExchangeError>;

    /// Fetches the last `limit` closed candles, oldest first, used once at
    /// startup to seed the ATH rolling window (§4.3).
    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;
}

/// Order placement, cancellation, and account state (C7, C6). Every method
/// is named after the wire operation it performs, not the strategy concept
/// that calls it.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Places an IOC limit order. Returns `ExchangeError::Ambiguous` if the
    /// response could not be confirmed (timeout after send) — the caller
    /// must resolve via `get_order` before treating the order as failed.
    async fn place_ioc_limit_order(
        &self,
        request: &OrderRequest,
    ) -> Result<OrderOutcome, ExchangeError>;

    /// Looks up an order's current state by the client-assigned id,
    /// idempotent and safe to call after a crash to reconcile a
    /// `WriteAheadIntent` left on disk (§4.5, §6).
    async fn get_order(&self, client_order_id: Uuid) -> Result<OrderOutcome, ExchangeError>;

    /// Current spot balances, used by the Drift Detector (C6) to compare
    /// against the engine's own ledger.
    async fn get_balances(&self) -> Result<Balances, ExchangeError>;

    /// Current exchange trading rules (tick/step/min-notional) for the
    /// traded symbol, refreshed on the schedule described in §5.
    async fn get_exchange_rules(&self, symbol: &str) -> Result<ExchangeRules, ExchangeError>;
}

/// Durable, optimistically-concurrent storage for the single active cycle
/// row (C5). `version` on the stored row is the concurrency token: a write
/// whose `expected_version` does not match the row in storage is rejected
/// with `PersistenceError::VersionConflict` rather than silently
/// overwriting a concurrent transition.
#[async_trait]
pub trait CycleStateStore: Send + Sync {
    /// Loads the current cycle row, creating a fresh READY cycle (§4.5) on
    /// first run if none exists yet.
    async fn load(&self, config: &StrategyConfig) -> Result<CycleState, PersistenceError>;

    /// Commits `state` if `state.version == ` the row currently in storage,
    /// then increments the stored version. Runs `check_invariants` before
    /// committing and returns `PersistenceError::InvariantViolation` rather
    /// than persisting a state that would fail §3's invariants.
    async fn commit(&self, state: &CycleState) -> Result<(), PersistenceError>;
}

/// Read access to the operator-maintained strategy configuration (C4),
/// loaded once at startup.
#[async_trait]
pub trait StrategyConfigRepository: Send + Sync {
    async fn load(&self) -> Result<StrategyConfig, PersistenceError>;
}

/// Append-only trade ledger (§3 `TradeRecord`).
#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn append(&self, trade: &TradeRecord) -> Result<(), PersistenceError>;
}

/// Append-only pause/resume audit trail (§3 `PauseState`, §6 `pause_states`),
/// distinct from the live `pause_reason` embedded in `CycleState`.
#[async_trait]
pub trait PauseStateRepository: Send + Sync {
    async fn record_pause(&self, pause: &PauseState) -> Result<(), PersistenceError>;

    /// Marks the most recent open pause episode (one with `resumed_at ==
    /// None`) as resumed at `resumed_at`. A no-op if there is none, which
    /// can legitimately happen for a resume that follows a restart where
    /// the in-memory pause id was lost; the episode simply stays open.
    async fn record_resume(&self, resumed_at: DateTime<Utc>) -> Result<(), PersistenceError>;
}

/// Sink for structured engine events (C11). Implementations own their own
/// batching and delivery retry; the application layer only calls `publish`.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: Event) -> Result<(), PersistenceError>;
}

/// Outbound operator notification channel (pause/resume/critical alerts),
/// distinct from `EventSink` because it is allowed to fail silently (a
/// dropped notification must never block the control loop) while the event
/// sink's durability is part of the audit trail (§4.11, §7).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str);
}

/// Minimal wall-clock seam so the application layer never calls
/// `Utc::now()` directly, keeping the controller deterministic under test
/// (§9 design note: inject time rather than reading it ambiently).
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
