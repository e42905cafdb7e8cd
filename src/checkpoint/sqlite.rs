//! SQLite-backed checkpointer.
//!
//! One row per `(thread_id, seq)` in the `turns` table, holding the
//! serialized conversation state; the `threads` table tracks known thread
//! ids. Appends are plain INSERTs so a duplicate sequence number surfaces
//! as a conflict instead of silently rewriting history. When the
//! `sqlite-migrations` feature is enabled (default), embedded migrations
//! run on connect; disabling it assumes external schema management.

use std::sync::Arc;

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use super::persistence::{PersistedCheckpoint, PersistedState, from_json, to_json};
use super::{Checkpoint, Checkpointer, CheckpointerError, Result};
use crate::state::ConversationState;

/// Default database URL, overridable via the `COLLOQUY_DB_URL` env var
/// (a `.env` file is honored).
const DEFAULT_DB_URL: &str = "sqlite://colloquy.db?mode=rwc";

/// Durable checkpoint storage with full per-thread turn history.
pub struct SqliteCheckpointer {
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SqliteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCheckpointer").finish()
    }
}

impl SqliteCheckpointer {
    /// Connects to (or creates) a SQLite database at `database_url`,
    /// e.g. `sqlite://colloquy.db?mode=rwc`.
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("connect error: {e}"),
            })?;
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(CheckpointerError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Connects using `COLLOQUY_DB_URL` from the environment (or `.env`),
    /// defaulting to a `colloquy.db` file in the working directory.
    pub async fn connect_from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let url =
            std::env::var("COLLOQUY_DB_URL").unwrap_or_else(|_| DEFAULT_DB_URL.to_string());
        Self::connect(&url).await
    }

    fn row_to_checkpoint(thread_id: &str, row: &SqliteRow) -> Result<Checkpoint> {
        let seq: i64 = row.get("seq");
        let state_json: String = row.get("state_json");
        let created_at: String = row.get("created_at");
        let persisted = PersistedCheckpoint {
            thread_id: thread_id.to_string(),
            seq: seq as u64,
            state: from_json::<PersistedState>(&state_json, "state")?,
            created_at,
        };
        Ok(Checkpoint::from(persisted))
    }

    /// Full checkpoint history for a thread, oldest first. Not part of the
    /// base trait; useful for inspection and replay.
    #[instrument(skip(self), err)]
    pub async fn history(&self, thread_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            r#"
            SELECT seq, state_json, created_at
            FROM turns
            WHERE thread_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(thread_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("select history: {e}"),
        })?;
        rows.iter()
            .map(|row| Self::row_to_checkpoint(thread_id, row))
            .collect()
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl Checkpointer for SqliteCheckpointer {
    #[instrument(skip(self, checkpoint), fields(thread_id = %checkpoint.thread_id, seq = checkpoint.seq), err)]
    async fn append(&self, checkpoint: Checkpoint) -> Result<()> {
        let state_json = to_json(&PersistedState::from(&checkpoint.state), "state")?;
        let created_at = checkpoint.created_at.to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("tx begin: {e}"),
            })?;

        sqlx::query("INSERT OR IGNORE INTO threads (id) VALUES (?1)")
            .bind(&checkpoint.thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("insert thread: {e}"),
            })?;

        // Plain INSERT: history is append-only, re-writing a sequence
        // number is a contract violation.
        sqlx::query(
            r#"
            INSERT INTO turns (thread_id, seq, state_json, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&checkpoint.thread_id)
        .bind(checkpoint.seq as i64)
        .bind(&state_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CheckpointerError::Conflict {
                    thread_id: checkpoint.thread_id.clone(),
                    seq: checkpoint.seq,
                }
            } else {
                CheckpointerError::Backend {
                    message: format!("insert turn: {e}"),
                }
            }
        })?;

        tx.commit().await.map_err(|e| CheckpointerError::Backend {
            message: format!("tx commit: {e}"),
        })?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let row = sqlx::query(
            r#"
            SELECT seq, state_json, created_at
            FROM turns
            WHERE thread_id = ?1
            ORDER BY seq DESC
            LIMIT 1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("select latest: {e}"),
        })?;
        row.map(|r| Self::row_to_checkpoint(thread_id, &r)).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_threads(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM threads ORDER BY created_at ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("list threads: {e}"),
            })?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }

    #[instrument(skip(self), err)]
    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("tx begin: {e}"),
            })?;
        sqlx::query("DELETE FROM turns WHERE thread_id = ?1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("delete turns: {e}"),
            })?;
        sqlx::query("DELETE FROM threads WHERE id = ?1")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("delete thread: {e}"),
            })?;
        tx.commit().await.map_err(|e| CheckpointerError::Backend {
            message: format!("tx commit: {e}"),
        })?;
        Ok(())
    }
}

// Conversion helper used by tests and callers that want the raw state.
impl SqliteCheckpointer {
    /// Latest conversation state for a thread, if any.
    pub async fn load_state(&self, thread_id: &str) -> Result<Option<ConversationState>> {
        Ok(self.load_latest(thread_id).await?.map(|c| c.state))
    }
}
