//! Push-based cycle-health reporter: sleep on an interval, snapshot the
//! live state, update the Prometheus gauges, then print a
//! `METRICS_JSON:`-prefixed line so log aggregators (Loki, Fluentd,
//! CloudWatch Logs) can pick it up without an HTTP scrape endpoint.

use crate::application::cycle_controller::CycleController;
use crate::domain::cycle::CycleStatus;
use crate::infrastructure::observability::metrics::Metrics;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub cycle: CycleSnapshot,
}

#[derive(Serialize)]
pub struct CycleSnapshot {
    pub status: String,
    pub capital_available_usdt: f64,
    pub btc_accumulated: f64,
    pub purchases_remaining: i32,
    pub reference_price: f64,
}

pub struct MetricsReporter {
    controller: Arc<CycleController>,
    metrics: Metrics,
    start_time: Instant,
    interval: Duration,
}

impl MetricsReporter {
    pub fn new(controller: Arc<CycleController>, metrics: Metrics, interval_seconds: u64) -> Self {
        Self {
            controller,
            metrics,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    pub async fn run(self) {
        info!(interval = ?self.interval, "cycle-health metrics reporter starting");
        loop {
            tokio::time::sleep(self.interval).await;

            let snapshot = self.collect_snapshot().await;
            match serde_json::to_string(&snapshot) {
                Ok(json) => println!("METRICS_JSON:{json}"),
                Err(err) => warn!(error = %err, "failed to serialize metrics snapshot"),
            }
        }
    }

    async fn collect_snapshot(&self) -> MetricsSnapshot {
        let state = self.controller.snapshot().await;
        let uptime = self.start_time.elapsed().as_secs();

        let capital = state.capital_available_usdt.to_f64().unwrap_or(0.0);
        let btc = state.btc_accumulated.to_f64().unwrap_or(0.0);
        let reference = state.reference_price.to_f64().unwrap_or(0.0);

        self.metrics.capital_available_usdt.set(capital);
        self.metrics.btc_accumulated.set(btc);
        self.metrics.purchases_remaining.set(state.purchases_remaining as f64);
        self.metrics.reference_price.set(reference);
        self.metrics.uptime_seconds.set(uptime as f64);

        let status = match state.status {
            CycleStatus::Ready => "READY",
            CycleStatus::Holding => "HOLDING",
            CycleStatus::Paused => "PAUSED",
        };

        MetricsSnapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            uptime_seconds: uptime,
            version: env!("CARGO_PKG_VERSION").to_string(),
            cycle: CycleSnapshot {
                status: status.to_string(),
                capital_available_usdt: capital,
                btc_accumulated: btc,
                purchases_remaining: state.purchases_remaining,
                reference_price: reference,
            },
        }
    }
}
