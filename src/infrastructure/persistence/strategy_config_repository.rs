//! SQLite-backed `StrategyConfigRepository` (C4): a single JSON-blob row,
//! upserted via `ON CONFLICT(id) DO UPDATE` on first run.

use crate::domain::errors::PersistenceError;
use crate::domain::ports::StrategyConfigRepository;
use crate::domain::strategy_config::StrategyConfig;
use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool};

pub struct SqliteStrategyConfigRepository {
    pool: SqlitePool,
    initial_capital_usdt: Decimal,
}

impl SqliteStrategyConfigRepository {
    pub fn new(pool: SqlitePool, initial_capital_usdt: Decimal) -> Self {
        Self {
            pool,
            initial_capital_usdt,
        }
    }
}

#[async_trait]
impl StrategyConfigRepository for SqliteStrategyConfigRepository {
    async fn load(&self) -> Result<StrategyConfig, PersistenceError> {
        let row = sqlx::query("SELECT config_json FROM strategy_config WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;

        if let Some(row) = row {
            let config_json: String = row
                .try_get("config_json")
                .map_err(|e| PersistenceError::Io(e.to_string()))?;
            let config: StrategyConfig = serde_json::from_str(&config_json)
                .map_err(|e| PersistenceError::Io(format!("corrupt strategy_config row: {e}")))?;
            return config
                .validated()
                .map_err(|e| PersistenceError::Io(format!("stored strategy_config violates its bounds: {e}")));
        }

        let default = StrategyConfig::default_inactive(self.initial_capital_usdt);
        let config_json = serde_json::to_string(&default)
            .map_err(|e| PersistenceError::Io(format!("failed to serialize default config: {e}")))?;
        sqlx::query(
            r#"
            INSERT INTO strategy_config (id, config_json, updated_at)
            VALUES (1, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                config_json = excluded.config_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&config_json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Io(e.to_string()))?;

        Ok(default)
    }
}
