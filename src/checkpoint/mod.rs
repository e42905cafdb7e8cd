//! Checkpoint store: durable, append-only conversation threads.
//!
//! A thread is a named, independently persisted conversation. After each
//! completed turn the engine appends one immutable [`Checkpoint`]; resuming
//! a thread loads the latest one. Threads are created implicitly on first
//! use and destroyed only by explicit [`delete_thread`](Checkpointer::delete_thread).
//!
//! Two backends ship with the crate: [`InMemoryCheckpointer`] for tests and
//! ephemeral sessions, and the SQLite-backed
//! [`SqliteCheckpointer`](crate::checkpoint::SqliteCheckpointer) (behind the
//! `sqlite` feature) for durability across process restarts.

pub mod persistence;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointer;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::state::ConversationState;

/// An immutable snapshot of one thread's conversation state after a
/// completed turn.
///
/// Checkpoints are owned by the store: the engine only reads the latest
/// one and appends new ones; stored checkpoints are never mutated.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    /// Thread this snapshot belongs to.
    pub thread_id: String,
    /// Monotonic per-thread sequence number, starting at 1.
    pub seq: u64,
    /// Conversation state at the end of the turn.
    pub state: ConversationState,
    /// When the checkpoint was created.
    pub created_at: DateTime<Utc>,
}

/// Failures at the persistence boundary.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(
        code(colloquy::checkpoint::backend),
        help("Check the database URL and that migrations have been applied.")
    )]
    Backend { message: String },

    #[error("checkpoint (thread {thread_id}, seq {seq}) already exists")]
    #[diagnostic(
        code(colloquy::checkpoint::conflict),
        help("Checkpoints are append-only; a sequence number can be written once.")
    )]
    Conflict { thread_id: String, seq: u64 },

    #[error("checkpoint serialization failed: {message}")]
    #[diagnostic(code(colloquy::checkpoint::serde))]
    Serde { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Durable key-value persistence of conversation state, keyed by thread.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Appends an immutable checkpoint to its thread's history.
    async fn append(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Loads the most recent checkpoint for a thread, `None` for unknown
    /// threads.
    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// All known thread identifiers.
    async fn list_threads(&self) -> Result<Vec<String>>;

    /// Destroys a thread and its entire history. Deleting an unknown
    /// thread is a no-op.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// Volatile checkpointer for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn append(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut threads = self.threads.write();
        let history = threads.entry(checkpoint.thread_id.clone()).or_default();
        if history.iter().any(|c| c.seq == checkpoint.seq) {
            return Err(CheckpointerError::Conflict {
                thread_id: checkpoint.thread_id,
                seq: checkpoint.seq,
            });
        }
        history.push(checkpoint);
        Ok(())
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .threads
            .read()
            .get(thread_id)
            .and_then(|history| history.iter().max_by_key(|c| c.seq))
            .cloned())
    }

    async fn list_threads(&self) -> Result<Vec<String>> {
        Ok(self.threads.read().keys().cloned().collect())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        self.threads.write().remove(thread_id);
        Ok(())
    }
}
