//! Prometheus gauges for the engine's cycle health: capital available,
//! BTC held, purchase slots remaining, the current reference price, and
//! process uptime. No HTTP scrape endpoint is exposed — the registry only
//! backs the periodic stdout line `MetricsReporter` prints; there is no
//! admin surface to scrape it from (push-based observability, no dashboards).

use prometheus::{Gauge, Opts, Registry};

#[derive(Clone)]
pub struct Metrics {
    _registry: Registry,
    pub capital_available_usdt: Gauge,
    pub btc_accumulated: Gauge,
    pub purchases_remaining: Gauge,
    pub reference_price: Gauge,
    pub uptime_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let capital_available_usdt = Gauge::with_opts(Opts::new(
            "dca_engine_capital_available_usdt",
            "USDT available for the next purchase within the current cycle",
        ))?;
        registry.register(Box::new(capital_available_usdt.clone()))?;

        let btc_accumulated = Gauge::with_opts(Opts::new(
            "dca_engine_btc_accumulated",
            "BTC held by the current cycle",
        ))?;
        registry.register(Box::new(btc_accumulated.clone()))?;

        let purchases_remaining = Gauge::with_opts(Opts::new(
            "dca_engine_purchases_remaining",
            "Purchase slots left in the current cycle",
        ))?;
        registry.register(Box::new(purchases_remaining.clone()))?;

        let reference_price = Gauge::with_opts(Opts::new(
            "dca_engine_reference_price_usdt",
            "Current weighted reference price (ATH when flat, cost basis when holding)",
        ))?;
        registry.register(Box::new(reference_price.clone()))?;

        let uptime_seconds = Gauge::with_opts(Opts::new(
            "dca_engine_uptime_seconds",
            "Seconds since the supervisor loop started",
        ))?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        Ok(Self {
            _registry: registry,
            capital_available_usdt,
            btc_accumulated,
            purchases_remaining,
            reference_price,
            uptime_seconds,
        })
    }
}
