//! Binance WebSocket kline stream, implementing the live leg of
//! `domain::ports::MarketDataSource`. Subscribes to `@kline_{timeframe}`
//! so every message already carries a candle rather than a raw trade tick,
//! with an exponential-backoff reconnect loop on disconnect.

use crate::domain::candle::Candle;
use crate::domain::errors::ExchangeError;
use crate::domain::ports::MarketDataSource;
use crate::infrastructure::binance::market_data::BinanceHistoricalCandles;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

const MAX_BACKOFF_SECS: u64 = 60;
const CANDLE_CHANNEL_CAPACITY: usize = 256;

pub struct BinanceCandleStream {
    ws_url: String,
    historical: BinanceHistoricalCandles,
}

impl BinanceCandleStream {
    pub fn new(ws_url: String, rest_base_url: String) -> Self {
        Self {
            ws_url,
            historical: BinanceHistoricalCandles::new(rest_base_url),
        }
    }
}

#[async_trait]
impl MarketDataSource for BinanceCandleStream {
    async fn subscribe_candles(
        &self,
        symbol: &str,
        timeframe: &str,
    ) -> Result<Receiver<Candle>, ExchangeError> {
        let (tx, rx) = mpsc::channel(CANDLE_CHANNEL_CAPACITY);
        let ws_url = self.ws_url.clone();
        let symbol = symbol.to_lowercase();
        let timeframe = timeframe.to_string();
        tokio::spawn(async move {
            run_with_backoff(&ws_url, &symbol, &timeframe, tx).await;
        });
        Ok(rx)
    }

    async fn historical_candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.historical.historical_candles(symbol, timeframe, limit).await
    }
}

async fn run_with_backoff(ws_url: &str, symbol: &str, timeframe: &str, tx: Sender<Candle>) {
    let mut backoff = 1u64;
    loop {
        match connect_and_stream(ws_url, symbol, timeframe, &tx).await {
            Ok(()) => {
                info!(%symbol, %timeframe, "kline stream closed gracefully, reconnecting");
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                backoff = 1;
            }
            Err(StreamEnded::ReceiverDropped) => {
                debug!(%symbol, "candle receiver dropped, stopping stream task");
                return;
            }
            Err(StreamEnded::Error(e)) => {
                error!(%symbol, %timeframe, error = %e, "kline stream error, reconnecting in {}s", backoff);
                tokio::time::sleep(tokio::time::Duration::from_secs(backoff)).await;
                backoff = (backoff * 2).min(MAX_BACKOFF_SECS);
            }
        }
    }
}

enum StreamEnded {
    ReceiverDropped,
    Error(String),
}

async fn connect_and_stream(
    ws_url: &str,
    symbol: &str,
    timeframe: &str,
    tx: &Sender<Candle>,
) -> Result<(), StreamEnded> {
    let stream_name = format!("{symbol}@kline_{timeframe}");
    let url = format!("{}/stream?streams={stream_name}", ws_url.trim_end_matches('/'));

    info!(%url, "connecting to Binance kline stream");
    let (ws_stream, _) = connect_async(&url)
        .await
        .map_err(|e| StreamEnded::Error(format!("connect failed: {e}")))?;
    info!("Binance kline stream connected");

    let (mut write, mut read) = ws_stream.split();
    let mut ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(180));

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if write.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return Err(StreamEnded::Error("failed to send ping".to_string()));
                }
            }
            msg = read.next() => {
                let Some(msg_result) = msg else {
                    return Ok(());
                };
                match msg_result {
                    Ok(Message::Text(text)) => {
                        match parse_kline_message(&text) {
                            Ok(Some(candle)) => {
                                if tx.send(candle).await.is_err() {
                                    return Err(StreamEnded::ReceiverDropped);
                                }
                            }
                            Ok(None) => {}
                            Err(e) => warn!(error = %e, "failed to parse kline message"),
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            return Err(StreamEnded::Error("failed to pong".to_string()));
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(frame)) => {
                        info!(?frame, "Binance kline stream closed by server");
                        return Ok(());
                    }
                    Ok(_) => {}
                    Err(e) => return Err(StreamEnded::Error(format!("read error: {e}"))),
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct StreamEnvelope {
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct KlinePayload {
    k: KlineBody,
}

#[derive(Deserialize)]
struct KlineBody {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "T")]
    close_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    /// Whether this kline is closed/final. Only final klines are forwarded;
    /// in-progress updates are filtered here, not by the caller (§4.2).
    #[serde(rename = "x")]
    is_final: bool,
}

/// Parses one combined-stream text frame. Returns `Ok(None)` for anything
/// that isn't a final kline update (in-progress candle ticks, subscription
/// acks) rather than treating it as an error.
fn parse_kline_message(text: &str) -> Result<Option<Candle>, String> {
    let envelope: StreamEnvelope = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(_) if text.contains("\"result\"") => return Ok(None),
        Err(e) => return Err(e.to_string()),
    };
    let payload: KlinePayload = serde_json::from_value(envelope.data).map_err(|e| e.to_string())?;
    if !payload.k.is_final {
        return Ok(None);
    }
    let parse = |s: &str| s.parse::<Decimal>().map_err(|e| e.to_string());
    Ok(Some(Candle {
        open_time: payload.k.open_time,
        close_time: payload.k.close_time,
        open: parse(&payload.k.open)?,
        high: parse(&payload.k.high)?,
        low: parse(&payload.k.low)?,
        close: parse(&payload.k.close)?,
        closed: true,
    }))
}
