//! Adapters wiring the domain/application ports to the outside world:
//! Binance over REST/WebSocket, SQLite for durable storage, wall-clock time,
//! and outbound webhook notifications.

pub mod binance;
pub mod clock;
pub mod core;
pub mod notifier;
pub mod observability;
pub mod persistence;
