//! Autonomous BTC/USDT DCA spot-trading engine. `domain` is the pure core
//! (types, invariants, port traits); `application` is the use-case
//! orchestration over those ports; `infrastructure` wires the ports to
//! Binance and SQLite; `config` loads the process's environment surface.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
