//! Supervisor Loop (C12): process lifecycle, startup validation, candle
//! delivery from intake into the Cycle Controller, and shutdown. Builds its
//! services once, then drives one long-running loop: no UI channel, no
//! multi-task fan-out, since the Cycle Controller is already a strict
//! single writer and there is exactly one intake source to drive it.

use crate::application::cycle_controller::CycleController;
use crate::application::event_sink::BatchingEventSink;
use crate::application::market_intake::{CandleWindow, IntakeOutcome};
use crate::domain::candle::Candle;
use crate::domain::events::{Event, EventType, Severity};
use crate::domain::order::{Balances, ExchangeRules};
use crate::domain::ports::{ExchangeClient, MarketDataSource};
use crate::domain::strategy_config::ATH_WINDOW;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

/// How often cached exchange rules (tick/step/min-notional) are refetched
/// while the loop runs (§5: "cached, refreshed on a schedule").
const EXCHANGE_RULES_REFRESH_SECS: u64 = 3600;

pub struct Supervisor {
    controller: Arc<CycleController>,
    market: Arc<dyn MarketDataSource>,
    exchange: Arc<dyn ExchangeClient>,
    event_sink: Arc<BatchingEventSink>,
    symbol: String,
    timeframe: String,
    initial_capital_usdt: Decimal,
}

impl Supervisor {
    pub fn new(
        controller: Arc<CycleController>,
        market: Arc<dyn MarketDataSource>,
        exchange: Arc<dyn ExchangeClient>,
        event_sink: Arc<BatchingEventSink>,
        symbol: String,
        timeframe: String,
        initial_capital_usdt: Decimal,
    ) -> Self {
        Self {
            controller,
            market,
            exchange,
            event_sink,
            symbol,
            timeframe,
            initial_capital_usdt,
        }
    }

    /// Runs until an operator shutdown signal (`Ctrl+C`) arrives. §4.12's
    /// sequence: startup validation, reconcile any leftover write-ahead
    /// intent, backfill the ATH window, subscribe to the live stream, then
    /// drive the Cycle Controller one closed candle at a time until told to
    /// stop.
    pub async fn run(&self) -> Result<()> {
        validate_startup(&*self.exchange, self.initial_capital_usdt).await?;

        let mut rules = self
            .exchange
            .get_exchange_rules(&self.symbol)
            .await
            .context("failed to fetch exchange rules at startup")?;

        self.controller
            .reconcile_pending_intent(&rules)
            .await
            .context("failed to reconcile a pending write-ahead intent from a previous run")?;

        let mut window = CandleWindow::new();
        seed_window(&*self.market, &self.symbol, &self.timeframe, &mut window).await?;

        let mut candles = self
            .market
            .subscribe_candles(&self.symbol, &self.timeframe)
            .await
            .context("failed to subscribe to the candle stream")?;

        self.publish(Event::new(EventType::WebsocketConnected, Severity::Info, "candle stream subscribed"))
            .await;
        self.publish(Event::new(EventType::Start, Severity::Info, "supervisor loop started")).await;
        info!(symbol = %self.symbol, timeframe = %self.timeframe, "supervisor loop running");

        let mut rules_refresh = tokio::time::interval(Duration::from_secs(EXCHANGE_RULES_REFRESH_SECS));
        rules_refresh.tick().await; // first tick fires immediately; rules were just fetched above

        loop {
            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, draining current tick before exit");
                    break;
                }

                _ = rules_refresh.tick() => {
                    match self.exchange.get_exchange_rules(&self.symbol).await {
                        Ok(fresh) => rules = fresh,
                        Err(err) => warn!(error = %err, "failed to refresh exchange rules, keeping cached values"),
                    }
                }

                maybe_candle = candles.recv() => {
                    match maybe_candle {
                        Some(candle) => {
                            if let Some(to_process) = drain_backlog(&mut candles, &mut window, candle) {
                                let snapshot = window.window();
                                if let Err(err) = self.controller.process_candle(to_process, &snapshot, &rules).await {
                                    warn!(error = %err, "failed to process candle");
                                    self.publish(Event::new(
                                        EventType::ValidationError,
                                        Severity::Error,
                                        format!("candle processing failed: {err}"),
                                    ))
                                    .await;
                                }
                            }
                        }
                        None => {
                            warn!("candle stream ended, no live intake left to drive the controller");
                            self.publish(Event::new(
                                EventType::WebsocketDisconnected,
                                Severity::Warning,
                                "candle stream ended",
                            ))
                            .await;
                            // Nothing productive left to do without a live feed;
                            // wait here for the operator to stop the process
                            // rather than spinning on an exhausted channel.
                            tokio::signal::ctrl_c().await.ok();
                            break;
                        }
                    }
                }
            }
        }

        self.publish(Event::new(EventType::Stop, Severity::Info, "supervisor loop stopped")).await;
        self.event_sink.flush().await;
        Ok(())
    }

    async fn publish(&self, event: Event) {
        if let Err(err) = self.event_sink.publish(event).await {
            warn!(error = %err, "supervisor failed to publish event");
        }
    }
}

/// Startup checks from §4.12: exchange reachability and a floor check
/// against the configured initial capital. Neither balance check is fatal on
/// its own — a low or mismatched spot balance is exactly what the Drift
/// Detector (C6) exists to police once trading begins — but both are worth a
/// loud warning before the loop starts placing orders. Unreachability of the
/// exchange itself is fatal: there is nothing useful the loop can do yet.
async fn validate_startup(exchange: &dyn ExchangeClient, initial_capital_usdt: Decimal) -> Result<()> {
    let balances: Balances = exchange.get_balances().await.context("exchange unreachable during startup validation")?;

    if balances.usdt < initial_capital_usdt {
        warn!(
            usdt = %balances.usdt,
            required = %initial_capital_usdt,
            "spot USDT balance is below the configured initial capital"
        );
    }
    if !balances.btc.is_zero() {
        warn!(
            btc = %balances.btc,
            "spot account holds BTC outside this cycle's own accounting; \
             the drift detector will compare against it regardless"
        );
    }
    Ok(())
}

/// Seeds the rolling ATH window from REST history so the engine doesn't have
/// to wait `ATH_WINDOW` live candles before buys are unblocked (§4.2, §4.3).
async fn seed_window(market: &dyn MarketDataSource, symbol: &str, timeframe: &str, window: &mut CandleWindow) -> Result<()> {
    let history = market
        .historical_candles(symbol, timeframe, ATH_WINDOW)
        .await
        .context("failed to backfill historical candles")?;
    for candle in history {
        if let Err(err) = window.accept(candle) {
            warn!(error = %err, "rejected a backfilled candle");
        }
    }
    Ok(())
}

/// Drains any candles already queued behind the one just received, folding
/// each into the rolling window but returning only the newest accepted one.
/// Per §5, backpressure drops older unprocessed candles: only the most
/// recent closed candle can still change a decision, and every candle
/// (processed or not) still needs to pass through the window so the ATH
/// calculation stays correct.
fn drain_backlog(rx: &mut Receiver<Candle>, window: &mut CandleWindow, first: Candle) -> Option<Candle> {
    let mut latest = offer(window, first);
    while let Ok(candle) = rx.try_recv() {
        if let Some(accepted) = offer(window, candle) {
            latest = Some(accepted);
        }
    }
    latest
}

fn offer(window: &mut CandleWindow, candle: Candle) -> Option<Candle> {
    match window.accept(candle) {
        Ok(IntakeOutcome::Accepted) => Some(candle),
        Ok(IntakeOutcome::Duplicate) => None,
        Err(err) => {
            warn!(error = %err, "rejected a malformed candle from the live stream");
            None
        }
    }
}
