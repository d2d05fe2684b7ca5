//! SQLite connection pool and schema setup: WAL journal mode, `CREATE TABLE
//! IF NOT EXISTS` migrations run unconditionally at startup.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to SQLite database")?;

        info!(%db_url, "connected to database");

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Creates every table the engine needs (§6): `strategy_config` and
    /// `cycle_state` are single-row tables (id fixed at 1); `trades`,
    /// `bot_events`, and `pause_states` are append-only.
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strategy_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                config_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create strategy_config table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cycle_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                state_json TEXT NOT NULL,
                version INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create cycle_state table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                cycle_id TEXT NOT NULL,
                side TEXT NOT NULL,
                client_order_id TEXT NOT NULL,
                exchange_order_id TEXT,
                requested_price TEXT NOT NULL,
                requested_qty TEXT NOT NULL,
                filled_price TEXT NOT NULL,
                filled_qty TEXT NOT NULL,
                fee_base TEXT NOT NULL,
                fee_quote TEXT NOT NULL,
                fee_other_json TEXT NOT NULL,
                status TEXT NOT NULL,
                requested_at INTEGER NOT NULL,
                settled_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_cycle_id ON trades (cycle_id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                occurred_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_bot_events_occurred_at ON bot_events (occurred_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create bot_events table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pause_states (
                id TEXT PRIMARY KEY,
                reason TEXT NOT NULL,
                detail TEXT,
                occurred_at INTEGER NOT NULL,
                resumed_at INTEGER
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create pause_states table")?;

        info!("database schema initialized");
        Ok(())
    }
}
