//! SQLite-backed `EventSinkBackend` (C11): the dumb durable sink that
//! `application::event_sink::BatchingEventSink` flushes into. One `INSERT`
//! per event in the batch, inside a single transaction.

use crate::application::event_sink::EventSinkBackend;
use crate::domain::errors::PersistenceError;
use crate::domain::events::Event;
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteEventSink {
    pool: SqlitePool,
}

impl SqliteEventSink {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSinkBackend for SqliteEventSink {
    async fn write_batch(&self, events: &[Event]) -> Result<(), PersistenceError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO bot_events (event_type, severity, message, metadata_json, occurred_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(format!("{:?}", event.event_type))
            .bind(format!("{:?}", event.severity))
            .bind(&event.message)
            .bind(event.metadata.to_string())
            .bind(event.occurred_at.timestamp_millis())
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(())
    }
}
