//! SQLite-backed `CycleStateStore` (C5): the single active cycle row is kept
//! as a JSON blob plus a bare `version` column used for the optimistic
//! concurrency check. Uses plain `sqlx::query`/`Row::try_get` rather than
//! the compile-time-checked `query!` macros, since there is no DATABASE_URL
//! available at build time here.

use crate::domain::cycle::{check_invariants, CycleState};
use crate::domain::errors::PersistenceError;
use crate::domain::ports::CycleStateStore;
use crate::domain::strategy_config::StrategyConfig;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

pub struct SqliteCycleStateStore {
    pool: SqlitePool,
    config: StrategyConfig,
}

impl SqliteCycleStateStore {
    pub fn new(pool: SqlitePool, config: StrategyConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl CycleStateStore for SqliteCycleStateStore {
    async fn load(&self, config: &StrategyConfig) -> Result<CycleState, PersistenceError> {
        let row = sqlx::query("SELECT state_json FROM cycle_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;

        if let Some(row) = row {
            let state_json: String = row
                .try_get("state_json")
                .map_err(|e| PersistenceError::Io(e.to_string()))?;
            let state: CycleState = serde_json::from_str(&state_json)
                .map_err(|e| PersistenceError::Io(format!("corrupt cycle_state row: {e}")))?;
            return Ok(state);
        }

        let fresh = CycleState::new_ready(config, chrono::Utc::now());
        let state_json = serde_json::to_string(&fresh)
            .map_err(|e| PersistenceError::Io(format!("failed to serialize fresh cycle state: {e}")))?;
        sqlx::query("INSERT INTO cycle_state (id, state_json, version) VALUES (1, ?, ?)")
            .bind(&state_json)
            .bind(fresh.version)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Io(e.to_string()))?;
        Ok(fresh)
    }

    /// Conditionally updates the row with `WHERE version = ?`, where `?` is
    /// the version the caller last observed (`state.version`, not yet
    /// incremented — the caller bumps its in-memory copy only after this
    /// call succeeds). Zero rows affected means a concurrent writer won the
    /// race; the current stored version is read back to report the conflict.
    async fn commit(&self, state: &CycleState) -> Result<(), PersistenceError> {
        check_invariants(state, &self.config)?;

        let new_version = state.version + 1;
        let mut versioned = state.clone();
        versioned.version = new_version;
        let state_json = serde_json::to_string(&versioned)
            .map_err(|e| PersistenceError::Io(format!("failed to serialize cycle state: {e}")))?;

        let result = sqlx::query(
            "UPDATE cycle_state SET state_json = ?, version = ? WHERE id = 1 AND version = ?",
        )
        .bind(&state_json)
        .bind(new_version)
        .bind(state.version)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Io(e.to_string()))?;

        if result.rows_affected() == 0 {
            let actual: i64 = sqlx::query("SELECT version FROM cycle_state WHERE id = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| PersistenceError::Io(e.to_string()))?
                .try_get("version")
                .map_err(|e| PersistenceError::Io(e.to_string()))?;
            return Err(PersistenceError::VersionConflict {
                expected: state.version,
                actual,
            });
        }

        Ok(())
    }
}
