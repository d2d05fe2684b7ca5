//! Binance REST market data: historical kline backfill used to seed the ATH
//! window at startup (§4.3). The live leg of `MarketDataSource` is
//! `websocket::BinanceCandleStream`; this module only covers
//! `historical_candles` (`GET /api/v3/klines`).

use crate::domain::candle::Candle;
use crate::domain::errors::ExchangeError;
use crate::infrastructure::binance::common::classify_status;
use crate::infrastructure::core::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use reqwest_middleware::ClientWithMiddleware;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

pub struct BinanceHistoricalCandles {
    client: ClientWithMiddleware,
    base_url: String,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl BinanceHistoricalCandles {
    pub fn new(base_url: String) -> Self {
        Self {
            client: HttpClientFactory::create_client(),
            base_url,
            circuit_breaker: Arc::new(CircuitBreaker::new(
                "BinanceMarketData",
                5,
                3,
                Duration::from_secs(60),
            )),
        }
    }

    /// Fetches the last `limit` closed candles, oldest first (§4.3).
    pub async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let url = format!(
            "{}/api/v3/klines?symbol={symbol}&interval={timeframe}&limit={limit}",
            self.base_url
        );
        self.circuit_breaker
            .call(async move {
                let response = self
                    .client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|err| ExchangeError::Retryable(format!("klines request failed: {err}")))?;

                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                if !status.is_success() {
                    return Err(classify_status(status, &body));
                }
                parse_klines(&body)
                    .map_err(|e| ExchangeError::Retryable(format!("malformed klines response: {e}")))
            })
            .await
            .map_err(|e| match e {
                CircuitBreakerError::Open(msg) => ExchangeError::Retryable(format!("circuit open: {msg}")),
                CircuitBreakerError::Inner(inner) => inner,
            })
    }
}

/// Binance kline array shape: `[open_time, open, high, low, close, volume,
/// close_time, ...]`. Fields 1-4 are decimal strings; parsed straight to
/// `Decimal` rather than via `f64`, since price/quantity math never uses
/// floating point in this engine.
fn parse_klines(body: &str) -> Result<Vec<Candle>, String> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| e.to_string())?;
    raw.iter().map(parse_one_kline).collect()
}

fn parse_one_kline(row: &serde_json::Value) -> Result<Candle, String> {
    let arr = row.as_array().ok_or("kline row was not an array")?;
    if arr.len() < 7 {
        return Err("kline row had fewer than 7 fields".to_string());
    }
    let open_time = arr[0].as_i64().ok_or("open_time was not an integer")?;
    let close_time = arr[6].as_i64().ok_or("close_time was not an integer")?;
    let open = parse_field(&arr[1])?;
    let high = parse_field(&arr[2])?;
    let low = parse_field(&arr[3])?;
    let close = parse_field(&arr[4])?;
    Ok(Candle {
        open_time,
        close_time,
        open,
        high,
        low,
        close,
        closed: true,
    })
}

fn parse_field(value: &serde_json::Value) -> Result<Decimal, String> {
    value
        .as_str()
        .ok_or("expected a string-encoded decimal")?
        .parse::<Decimal>()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_kline_rows() {
        let body = r#"[
            [1700000000000, "50000.00", "50500.00", "49800.00", "50200.00", "12.5", 1700003600000, "625000.00", 100, "6.0", "300000.00", "0"]
        ]"#;
        let candles = parse_klines(body).unwrap();
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.open_time, 1_700_000_000_000);
        assert_eq!(c.close_time, 1_700_003_600_000);
        assert_eq!(c.close, "50200.00".parse::<Decimal>().unwrap());
        assert!(c.closed);
    }

    #[test]
    fn rejects_malformed_row() {
        let body = r#"[[1700000000000, "bad", "50500.00", "49800.00", "50200.00", "12.5", 1700003600000]]"#;
        assert!(parse_klines(body).is_err());
    }
}
