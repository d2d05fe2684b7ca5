//! SQLite-backed append-only `TradeRepository` (§3 `TradeRecord`).

use crate::domain::errors::PersistenceError;
use crate::domain::ports::TradeRepository;
use crate::domain::trade::TradeRecord;
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteTradeRepository {
    pool: SqlitePool,
}

impl SqliteTradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn append(&self, trade: &TradeRecord) -> Result<(), PersistenceError> {
        let fee_other_json = serde_json::to_string(&trade.fee_other)
            .map_err(|e| PersistenceError::Io(format!("failed to serialize fee_other: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO trades (
                cycle_id, side, client_order_id, exchange_order_id,
                requested_price, requested_qty, filled_price, filled_qty,
                fee_base, fee_quote, fee_other_json, status,
                requested_at, settled_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(trade.cycle_id.to_string())
        .bind(trade.side.to_string())
        .bind(trade.client_order_id.to_string())
        .bind(&trade.exchange_order_id)
        .bind(trade.requested_price.to_string())
        .bind(trade.requested_qty.to_string())
        .bind(trade.filled_price.to_string())
        .bind(trade.filled_qty.to_string())
        .bind(trade.fee_base.to_string())
        .bind(trade.fee_quote.to_string())
        .bind(fee_other_json)
        .bind(format!("{:?}", trade.status))
        .bind(trade.requested_at.timestamp_millis())
        .bind(trade.settled_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Io(e.to_string()))?;

        Ok(())
    }
}
