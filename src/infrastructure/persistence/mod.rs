pub mod cycle_state_repository;
pub mod database;
pub mod event_sink_repository;
pub mod pause_state_repository;
pub mod strategy_config_repository;
pub mod trade_repository;

pub use cycle_state_repository::SqliteCycleStateStore;
pub use database::Database;
pub use event_sink_repository::SqliteEventSink;
pub use pause_state_repository::SqlitePauseStateRepository;
pub use strategy_config_repository::SqliteStrategyConfigRepository;
pub use trade_repository::SqliteTradeRepository;
