//! Binance adapters for the two external-facing ports: `ExchangeClient`
//! (execution) and `MarketDataSource` (historical + live candles).

pub mod common;
pub mod execution;
pub mod market_data;
pub mod websocket;

pub use execution::BinanceExecutionClient;
pub use websocket::BinanceCandleStream;
