//! Cycle Controller (C9): the single writer of `CycleState`. Orchestrates
//! one closed candle end-to-end — ATH refresh, trigger evaluation, drift
//! check, write-ahead persist, order placement, fill application, cycle
//! reset — per §4.9. Represented internally as transitions over the sum
//! type in `domain::cycle`, guarded by a single async mutex so two ticks
//! are never interleaved even if the Supervisor ever misbehaves.

use crate::application::drift::{check_drift, DriftKind, DriftOutcome};
use crate::application::executor::OrderExecutor;
use crate::application::pause::{self, ErrorWindow};
use crate::application::reference_price;
use crate::application::trigger::{self, WindowReadiness};
use crate::domain::candle::Candle;
use crate::domain::cycle::{check_invariants, CycleState, CycleStatus, PauseReason, WriteAheadIntent};
use crate::domain::decimal::{floor_to_multiple, is_dust};
use crate::domain::errors::PersistenceError;
use crate::domain::events::{Event, EventType, Severity};
use crate::domain::order::{ExchangeRules, OrderOutcome, OrderSide, OrderStatus};
use crate::domain::pause_state::PauseState;
use crate::domain::ports::{Clock, CycleStateStore, EventSink, ExchangeClient, PauseStateRepository, TradeRepository};
use crate::domain::strategy_config::{ATH_WINDOW, StrategyConfig};
use crate::domain::trade::TradeRecord;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

const NON_RETRYABLE_PREFIX: &str = "non-retryable exchange error";
const ERROR_WINDOW_MINUTES: i64 = 15;

pub struct CycleController {
    store: Arc<dyn CycleStateStore>,
    exchange: Arc<dyn ExchangeClient>,
    executor: OrderExecutor,
    event_sink: Arc<dyn EventSink>,
    trade_repo: Arc<dyn TradeRepository>,
    pause_repo: Arc<dyn PauseStateRepository>,
    clock: Arc<dyn Clock>,
    config: StrategyConfig,
    state: Mutex<CycleState>,
    error_window: Mutex<ErrorWindow>,
}

/// Result of applying a sell OrderOutcome to the in-flight candidate state.
enum SellApplication {
    FullReset,
    Partial,
    NoFill,
    /// The submission was ambiguous and its status lookup also failed
    /// (`OrderStatus::Unresolved`). No accumulator changed and the
    /// write-ahead intent is left in place for restart reconciliation, so
    /// the buy leg must not run this tick — placing a buy now would
    /// overwrite that pending intent with a fresh one.
    Unresolved,
}

impl CycleController {
    pub fn new(
        initial_state: CycleState,
        config: StrategyConfig,
        store: Arc<dyn CycleStateStore>,
        exchange: Arc<dyn ExchangeClient>,
        event_sink: Arc<dyn EventSink>,
        trade_repo: Arc<dyn TradeRepository>,
        pause_repo: Arc<dyn PauseStateRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor: OrderExecutor::new(exchange.clone()),
            store,
            exchange,
            event_sink,
            trade_repo,
            pause_repo,
            clock,
            config,
            state: Mutex::new(initial_state),
            error_window: Mutex::new(ErrorWindow::new(chrono::Duration::minutes(ERROR_WINDOW_MINUTES))),
        }
    }

    pub async fn snapshot(&self) -> CycleState {
        self.state.lock().await.clone()
    }

    /// Resolves a `WriteAheadIntent` left on disk by a previous process that
    /// crashed (or was killed) between persisting the intent and persisting
    /// the observed order outcome (§4.5, §6). Called once at startup, before
    /// the Supervisor starts feeding live candles through `process_candle`.
    /// A no-op if there is nothing pending.
    pub async fn reconcile_pending_intent(&self, rules: &ExchangeRules) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;
        let Some(intent) = state.pending_intent else { return Ok(()) };

        info!(client_order_id = %intent.client_order_id, side = %intent.side, "reconciling pending order intent from previous run");
        let outcome = match self.exchange.get_order(intent.client_order_id).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "could not resolve pending intent on restart, treating as unfilled");
                OrderOutcome::rejected_locally(intent.client_order_id, format!("reconciliation failed: {err}"))
            }
        };

        match intent.side {
            OrderSide::Sell => {
                self.apply_sell_outcome(&mut state, &outcome, rules.step);
            }
            OrderSide::Buy => {
                self.apply_buy_outcome(&mut state, &outcome);
            }
        }
        state.pending_intent = None;
        self.record_trade(state.cycle_id, intent.side, &outcome, Decimal::ZERO, Decimal::ZERO).await;
        self.store.commit(&state).await?;
        state.version += 1;
        Ok(())
    }

    /// Processes one closed candle end-to-end (§4.9). `window` is the
    /// immutable slice of up to `ATH_WINDOW` closed candles intake
    /// maintains; `rules` are the cached exchange tick/step/notional
    /// bounds for the traded symbol.
    pub async fn process_candle(
        &self,
        candle: Candle,
        window: &[Candle],
        rules: &ExchangeRules,
    ) -> Result<(), PersistenceError> {
        let mut state = self.state.lock().await;

        if state.status == CycleStatus::Paused {
            self.publish(heartbeat_event(state.cycle_id)).await;
            return Ok(());
        }

        if state.btc_accumulated.is_zero()
            && let Some(ath) = reference_price::compute_ath(window)
        {
            state.ath_price = ath;
            state.reference_price = ath;
        }
        let window_ready = window.len() >= ATH_WINDOW;

        // Set when the sell leaves the cycle still HOLDING (a partial fill)
        // or its outcome unresolved (pending intent left in place) — either
        // way the buy leg must not run this tick.
        let mut skip_buy_this_tick = false;

        if let Some(qty) = trigger::sell_decision(&candle, &state, &self.config) {
            match self.handle_sell(&mut state, qty, candle.close, rules).await? {
                Some(SellApplication::Partial) | Some(SellApplication::Unresolved) => skip_buy_this_tick = true,
                Some(SellApplication::FullReset) | Some(SellApplication::NoFill) => {}
                None => return Ok(()), // paused mid-flow
            }
        }

        if !skip_buy_this_tick
            && let Some(usdt) = trigger::buy_decision(
                &candle,
                &state,
                &self.config,
                WindowReadiness { buys_allowed: window_ready },
                rules.min_notional,
            )
        {
            self.handle_buy(&mut state, usdt, candle.close, rules).await?;
        }

        self.store.commit(&state).await?;
        Ok(())
    }

    /// Performs the drift check immediately before order contact (§4.6,
    /// §4.9 step 3a/4a). On HALT, pauses and persists; returns `Ok(false)`
    /// to signal the caller must stop processing this tick.
    async fn drift_guard(&self, state: &mut CycleState) -> Result<bool, PersistenceError> {
        let balances = match self.exchange.get_balances().await {
            Ok(b) => b,
            Err(err) => {
                warn!(error = %err, "balance lookup failed before drift check, pausing conservatively");
                self.enter_pause(state, "balance_lookup_failed", Some(err.to_string())).await?;
                return Ok(false);
            }
        };

        match check_drift(&balances, state) {
            DriftOutcome::Ok => Ok(true),
            DriftOutcome::Halt { which, value, threshold } => {
                let reason = match which {
                    DriftKind::Usdt => "drift_usdt",
                    DriftKind::Btc => "drift_btc",
                };
                self.publish(Event::new(EventType::DriftHalt, Severity::Critical, "drift exceeded threshold")
                    .with_metadata(serde_json::json!({
                        "cycle_id": state.cycle_id,
                        "which": reason,
                        "value": value.to_string(),
                        "threshold": threshold.to_string(),
                    })))
                    .await;
                self.enter_pause(state, reason, Some(format!("value={value} threshold={threshold}"))).await?;
                Ok(false)
            }
        }
    }

    async fn handle_sell(
        &self,
        state: &mut CycleState,
        qty: Decimal,
        ref_close: Decimal,
        rules: &ExchangeRules,
    ) -> Result<Option<SellApplication>, PersistenceError> {
        if !self.drift_guard(state).await? {
            return Ok(None);
        }

        let client_order_id = Uuid::new_v4();
        let now = self.clock.now();
        state.pending_intent = Some(WriteAheadIntent {
            client_order_id,
            side: OrderSide::Sell,
            created_at: now,
        });
        self.store.commit(state).await?;
        state.version += 1;

        let outcome = self
            .executor
            .place_sell(client_order_id, qty, ref_close, self.config.slippage_sell_pct, rules)
            .await;

        self.record_non_retryable(state, &outcome).await?;
        let application = self.apply_sell_outcome(state, &outcome, rules.step);
        if !matches!(application, SellApplication::Unresolved) {
            state.pending_intent = None;
        }
        self.record_trade(state.cycle_id, OrderSide::Sell, &outcome, ref_close, qty).await;
        self.publish(trade_event(state.cycle_id, OrderSide::Sell, &outcome)).await;

        Ok(Some(application))
    }

    /// Applies a sell `OrderOutcome` to `state` per §4.9 step 3d. Returns
    /// which branch fired so the caller can decide whether to still
    /// evaluate a buy this tick.
    fn apply_sell_outcome(&self, state: &mut CycleState, outcome: &OrderOutcome, step: Decimal) -> SellApplication {
        if outcome.status == OrderStatus::Unresolved {
            return SellApplication::Unresolved;
        }
        if !outcome.status.has_fill() {
            return SellApplication::NoFill;
        }

        let btc_sold_net = outcome.filled_qty - outcome.fee_base;
        state.btc_accumulated = (state.btc_accumulated - btc_sold_net).max(Decimal::ZERO);
        let net_usdt_received = outcome.quote_qty - outcome.fee_quote;

        if is_dust(state.btc_accumulated, step) {
            // The cycle's entire net-bought BTC is, by construction, what
            // ends up sold across however many orders it took to flatten
            // (partial legs never reduce `btc_accum_net`, see the partial
            // branch below) — so `btc_accum_net` here equals
            // "total_btc_sold_this_cycle" from §4.9 step 3d, and
            // `reference_price * btc_accum_net` equals `cost_accum_usdt`
            // within rounding tolerance (invariant 2).
            let principal = state.reference_price * state.btc_accum_net;
            let profit = (net_usdt_received - principal).max(Decimal::ZERO);
            state.capital_available_usdt += principal + profit;

            state.btc_accumulated = Decimal::ZERO;
            state.cost_accum_usdt = Decimal::ZERO;
            state.btc_accum_net = Decimal::ZERO;
            state.purchases_remaining = self.config.max_purchases;
            state.purchases_executed = 0;
            state.buy_amount_usdt = floor_to_multiple(
                state.capital_available_usdt / Decimal::from(self.config.max_purchases),
                dec!(0.01),
            )
            .unwrap_or(Decimal::ZERO);
            state.reference_price = state.ath_price;
            state.status = CycleStatus::Ready;
            SellApplication::FullReset
        } else {
            state.status = CycleStatus::Holding;
            SellApplication::Partial
        }
    }

    async fn handle_buy(
        &self,
        state: &mut CycleState,
        desired_usdt: Decimal,
        ref_close: Decimal,
        rules: &ExchangeRules,
    ) -> Result<(), PersistenceError> {
        if !self.drift_guard(state).await? {
            return Ok(());
        }

        let client_order_id = Uuid::new_v4();
        let now = self.clock.now();
        state.pending_intent = Some(WriteAheadIntent {
            client_order_id,
            side: OrderSide::Buy,
            created_at: now,
        });
        self.store.commit(state).await?;
        state.version += 1;

        let outcome = self
            .executor
            .place_buy(client_order_id, desired_usdt, ref_close, self.config.slippage_buy_pct, rules)
            .await;

        self.record_non_retryable(state, &outcome).await?;
        self.apply_buy_outcome(state, &outcome);
        if outcome.status != OrderStatus::Unresolved {
            state.pending_intent = None;
        }
        self.record_trade(state.cycle_id, OrderSide::Buy, &outcome, ref_close, desired_usdt / ref_close).await;
        self.publish(trade_event(state.cycle_id, OrderSide::Buy, &outcome)).await;

        Ok(())
    }

    /// Applies a buy `OrderOutcome` to `state` per §4.9 step 4d. A
    /// zero-fill outcome (EXPIRED or any rejection) leaves every
    /// accumulator untouched and does not consume a purchase slot.
    fn apply_buy_outcome(&self, state: &mut CycleState, outcome: &OrderOutcome) {
        if !outcome.status.has_fill() {
            return;
        }

        let usdt_spent = outcome.quote_qty + outcome.fee_quote;
        let net_btc_received = outcome.filled_qty - outcome.fee_base;

        state.cost_accum_usdt += outcome.quote_qty + outcome.fee_quote + outcome.fee_base * outcome.avg_price;
        state.btc_accum_net += net_btc_received;
        state.btc_accumulated += net_btc_received;
        state.capital_available_usdt -= usdt_spent;

        if let Ok(reference) = crate::domain::decimal::checked_div(state.cost_accum_usdt, state.btc_accum_net) {
            state.reference_price = reference;
        }
        state.purchases_remaining -= 1;
        state.purchases_executed += 1;
        state.status = CycleStatus::Holding;
    }

    /// Pauses per §4.10: writes `status = PAUSED`, records `pause_reason`,
    /// and persists. If the resulting candidate fails invariants (it
    /// shouldn't — PAUSED has no extra shape constraint), the error
    /// propagates rather than silently discarding the pause.
    async fn enter_pause(
        &self,
        state: &mut CycleState,
        reason: &str,
        detail: Option<String>,
    ) -> Result<(), PersistenceError> {
        let now = self.clock.now();
        state.status = CycleStatus::Paused;
        state.pause_reason = Some(pause::pause_reason(reason, detail.clone(), now));
        check_invariants(state, &self.config)?;
        self.store.commit(state).await?;
        state.version += 1;
        if let Err(err) = self.pause_repo.record_pause(&PauseState::new(reason, detail, now)).await {
            warn!(error = %err, "failed to append pause-state audit record");
        }
        self.publish(
            Event::new(EventType::Pause, Severity::Warning, format!("paused: {reason}"))
                .with_metadata(serde_json::json!({"cycle_id": state.cycle_id, "reason": reason})),
        )
        .await;
        Ok(())
    }

    /// Resume validation and transition (§4.10). Returns the validation
    /// failure without mutating state if any check fails.
    pub async fn resume(&self, exchange_reachable: bool) -> Result<(), pause::ResumeRejection> {
        let mut state = self.state.lock().await;
        let balances = self
            .exchange
            .get_balances()
            .await
            .map_err(|_| pause::ResumeRejection::ExchangeUnreachable)?;
        let new_status = pause::validate_resume(&state, &balances, exchange_reachable, &self.config)?;
        state.status = new_status;
        state.pause_reason = None;
        self.store
            .commit(&state)
            .await
            .map_err(|e| pause::ResumeRejection::InvariantsStillViolated(e.to_string()))?;
        state.version += 1;
        drop(state);
        let now = self.clock.now();
        if let Err(err) = self.pause_repo.record_resume(now).await {
            warn!(error = %err, "failed to record resume in pause-state audit trail");
        }
        self.publish(Event::new(EventType::Resume, Severity::Info, "resumed")).await;
        Ok(())
    }

    /// Tracks non-retryable exchange errors within a rolling window and
    /// pauses once the threshold is reached (§4.10). The classification is
    /// inferred from the `OrderOutcome::reason` string the executor
    /// attaches when it translates an `ExchangeError::NonRetryable` into a
    /// `RejectedLocally` outcome — see `application::executor`. Takes the
    /// already-locked candidate state rather than re-locking `self.state`,
    /// since every call site is itself inside the `process_candle` critical
    /// section.
    async fn record_non_retryable(
        &self,
        state: &mut CycleState,
        outcome: &OrderOutcome,
    ) -> Result<(), PersistenceError> {
        let Some(reason) = &outcome.reason else { return Ok(()) };
        if !reason.starts_with(NON_RETRYABLE_PREFIX) {
            return Ok(());
        }
        let now = self.clock.now();
        let threshold_hit = self.error_window.lock().await.record(now);
        if threshold_hit && state.status != CycleStatus::Paused {
            self.enter_pause(state, "repeated_non_retryable_errors", Some(reason.clone()))
                .await?;
        }
        Ok(())
    }

    async fn record_trade(
        &self,
        cycle_id: Uuid,
        side: OrderSide,
        outcome: &OrderOutcome,
        requested_price: Decimal,
        requested_qty: Decimal,
    ) {
        let now = self.clock.now();
        let record = TradeRecord {
            cycle_id,
            side,
            client_order_id: outcome.client_order_id,
            exchange_order_id: outcome.exchange_order_id.clone(),
            requested_price,
            requested_qty,
            filled_price: outcome.avg_price,
            filled_qty: outcome.filled_qty,
            fee_base: outcome.fee_base,
            fee_quote: outcome.fee_quote,
            fee_other: outcome.fee_other.clone(),
            status: outcome.status,
            requested_at: now,
            settled_at: now,
        };
        if let Err(err) = self.trade_repo.append(&record).await {
            warn!(error = %err, "failed to append trade record");
        }
    }

    async fn publish(&self, event: Event) {
        if let Err(err) = self.event_sink.publish(event).await {
            warn!(error = %err, "event sink publish failed");
        }
    }
}

fn heartbeat_event(cycle_id: Uuid) -> Event {
    Event::new(EventType::Performance, Severity::Info, "heartbeat: cycle paused, no action taken")
        .with_metadata(serde_json::json!({"cycle_id": cycle_id}))
}

fn trade_event(cycle_id: Uuid, side: OrderSide, outcome: &OrderOutcome) -> Event {
    let (event_type, severity) = if outcome.status.has_fill() {
        (EventType::TradeExecuted, Severity::Info)
    } else {
        (EventType::TradeFailed, Severity::Warning)
    };
    info!(cycle_id = %cycle_id, side = %side, status = ?outcome.status, "trade outcome applied");
    Event::new(event_type, severity, format!("{side} {:?}", outcome.status)).with_metadata(serde_json::json!({
        "cycle_id": cycle_id,
        "client_order_id": outcome.client_order_id,
        "filled_qty": outcome.filled_qty.to_string(),
        "quote_qty": outcome.quote_qty.to_string(),
        "fee_other": outcome.fee_other,
    }))
}
