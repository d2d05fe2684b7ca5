//! Headless process entrypoint: `dotenvy` + env-filtered `tracing-subscriber`
//! for logging, environment-sourced bootstrap config, adapter construction,
//! and a `tokio::signal::ctrl_c()`-driven shutdown. One pair, one strategy,
//! no GUI or metrics HTTP server — the engine logs a periodic cycle-health
//! line to stdout instead.

use anyhow::{Context, Result};
use dca_engine::application::cycle_controller::CycleController;
use dca_engine::application::event_sink::{BatchingConfig, BatchingEventSink};
use dca_engine::application::supervisor::Supervisor;
use dca_engine::config::BootstrapConfig;
use dca_engine::domain::ports::{CycleStateStore, StrategyConfigRepository};
use dca_engine::infrastructure::binance::{BinanceCandleStream, BinanceExecutionClient};
use dca_engine::infrastructure::clock::SystemClock;
use dca_engine::infrastructure::notifier::{NoopNotifier, WebhookNotifier};
use dca_engine::infrastructure::observability::{Metrics, MetricsReporter};
use dca_engine::infrastructure::persistence::{
    Database, SqliteCycleStateStore, SqliteEventSink, SqlitePauseStateRepository, SqliteStrategyConfigRepository,
    SqliteTradeRepository,
};
use dca_engine::domain::ports::Notifier;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false).pretty())
        .init();

    info!("dca-engine {} starting", env!("CARGO_PKG_VERSION"));

    let bootstrap = BootstrapConfig::from_env().context("failed to load bootstrap configuration")?;
    info!(symbol = %bootstrap.symbol, database_url = %bootstrap.database_url, "bootstrap configuration loaded");

    let db = Database::new(&bootstrap.database_url).await.context("failed to open database")?;

    let strategy_repo = SqliteStrategyConfigRepository::new(db.pool.clone(), bootstrap.initial_capital_usdt);
    let config = strategy_repo.load().await.context("failed to load strategy configuration")?;
    if !config.is_active {
        anyhow::bail!(
            "strategy_config is not active; a default inactive row has been written — \
             mark it active in the database and restart to begin trading"
        );
    }
    info!(timeframe = %config.timeframe, max_purchases = config.max_purchases, "strategy configuration loaded");

    let cycle_store: Arc<dyn CycleStateStore> =
        Arc::new(SqliteCycleStateStore::new(db.pool.clone(), config.clone()));
    let initial_state = cycle_store.load(&config).await.context("failed to load cycle state")?;
    info!(cycle_id = %initial_state.cycle_id, status = ?initial_state.status, "cycle state loaded");

    let notifier: Arc<dyn Notifier> = match &bootstrap.notifier_url {
        Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
        None => Arc::new(NoopNotifier),
    };

    let event_backend = Arc::new(SqliteEventSink::new(db.pool.clone()));
    let event_sink = Arc::new(BatchingEventSink::new(event_backend, Some(notifier), BatchingConfig::default()));

    let trade_repo = Arc::new(SqliteTradeRepository::new(db.pool.clone()));
    let pause_repo = Arc::new(SqlitePauseStateRepository::new(db.pool.clone()));
    let clock = Arc::new(SystemClock);

    let exchange = Arc::new(BinanceExecutionClient::new(
        bootstrap.binance.api_key.clone(),
        bootstrap.binance.api_secret.clone(),
        bootstrap.binance.base_url.clone(),
    ));
    let market = Arc::new(BinanceCandleStream::new(bootstrap.binance.ws_url.clone(), bootstrap.binance.base_url.clone()));

    let controller = Arc::new(CycleController::new(
        initial_state,
        config.clone(),
        cycle_store,
        exchange.clone(),
        event_sink.clone(),
        trade_repo,
        pause_repo,
        clock,
    ));

    let metrics = Metrics::new().context("failed to register cycle-health metrics")?;
    let reporter = MetricsReporter::new(controller.clone(), metrics, bootstrap.observability_interval_secs);
    tokio::spawn(reporter.run());

    let supervisor = Supervisor::new(
        controller,
        market,
        exchange,
        event_sink,
        bootstrap.symbol,
        config.timeframe,
        bootstrap.initial_capital_usdt,
    );

    info!("handing off to supervisor loop; press Ctrl+C to shut down");
    supervisor.run().await.context("supervisor loop exited with an error")?;

    info!("shutdown complete");
    Ok(())
}
