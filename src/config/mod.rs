//! Process bootstrap configuration (§6 Configuration surface). Every
//! strategy parameter lives in the persistent store, not the environment —
//! this only covers what the process needs before it can even open that
//! store.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use std::env;

#[derive(Debug, Clone)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    pub ws_url: String,
}

impl BinanceCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: env::var("BINANCE_API_KEY").context("BINANCE_API_KEY must be set")?,
            api_secret: env::var("BINANCE_API_SECRET").context("BINANCE_API_SECRET must be set")?,
            base_url: env::var("BINANCE_BASE_URL")
                .unwrap_or_else(|_| "https://api.binance.com".to_string()),
            ws_url: env::var("BINANCE_WS_URL")
                .unwrap_or_else(|_| "wss://stream.binance.com:9443".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub binance: BinanceCredentials,
    pub database_url: String,
    pub notifier_url: Option<String>,
    /// Seed capital for the very first `StrategyConfig` row written on
    /// first startup. Every parameter after that lives in the store, not
    /// here — restarts read it back from `strategy_config`, not the
    /// environment, so this value is only ever consulted once per database.
    pub initial_capital_usdt: Decimal,
    pub symbol: String,
    /// Interval between `METRICS_JSON:` stdout lines.
    pub observability_interval_secs: u64,
}

impl BootstrapConfig {
    pub fn from_env() -> Result<Self> {
        let initial_capital_usdt: Decimal = env::var("INITIAL_CAPITAL_USDT")
            .context("INITIAL_CAPITAL_USDT must be set")?
            .parse()
            .context("INITIAL_CAPITAL_USDT must be a decimal number")?;
        if initial_capital_usdt <= Decimal::ZERO {
            anyhow::bail!("INITIAL_CAPITAL_USDT must be positive, got {initial_capital_usdt}");
        }

        Ok(Self {
            binance: BinanceCredentials::from_env()?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://dca_engine.db".to_string()),
            notifier_url: env::var("NOTIFIER_WEBHOOK_URL").ok(),
            initial_capital_usdt,
            symbol: env::var("TRADING_SYMBOL").unwrap_or_else(|_| "BTCUSDT".to_string()),
            observability_interval_secs: env::var("METRICS_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
        })
    }
}
