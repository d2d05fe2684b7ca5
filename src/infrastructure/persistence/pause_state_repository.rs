//! SQLite-backed `PauseStateRepository` (§3 `PauseState`, §6 `pause_states`):
//! an append-only audit trail of every pause/resume episode, separate from
//! the live `pause_reason` embedded in `cycle_state`.

use crate::domain::errors::PersistenceError;
use crate::domain::pause_state::PauseState;
use crate::domain::ports::PauseStateRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SqlitePauseStateRepository {
    pool: SqlitePool,
}

impl SqlitePauseStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PauseStateRepository for SqlitePauseStateRepository {
    async fn record_pause(&self, pause: &PauseState) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO pause_states (id, reason, detail, occurred_at, resumed_at)
            VALUES (?, ?, ?, ?, NULL)
            "#,
        )
        .bind(pause.id.to_string())
        .bind(&pause.reason)
        .bind(&pause.detail)
        .bind(pause.occurred_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(())
    }

    async fn record_resume(&self, resumed_at: DateTime<Utc>) -> Result<(), PersistenceError> {
        let open = sqlx::query(
            "SELECT id FROM pause_states WHERE resumed_at IS NULL ORDER BY occurred_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::Io(e.to_string()))?;

        let Some(row) = open else {
            return Ok(());
        };
        let id: String = row.try_get("id").map_err(|e| PersistenceError::Io(e.to_string()))?;

        sqlx::query("UPDATE pause_states SET resumed_at = ? WHERE id = ?")
            .bind(resumed_at.timestamp_millis())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(())
    }
}
