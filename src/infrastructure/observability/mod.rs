//! Push-based cycle-health observability: a small Prometheus registry backing
//! a periodic `METRICS_JSON:` stdout line. No HTTP scrape endpoint is
//! exposed — this engine has no admin surface to serve one from.

pub mod metrics;
pub mod reporter;

pub use metrics::Metrics;
pub use reporter::MetricsReporter;
