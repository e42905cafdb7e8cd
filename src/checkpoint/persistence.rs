//! Serde-friendly persisted shapes for checkpoints.
//!
//! Explicit persistence structs decoupled from the in-memory types keep
//! the backends lean: conversion logic lives here, I/O lives in the
//! backend modules. The per-turn `iteration_count` is deliberately absent
//! from the persisted shape; it is meaningless across turns and resets to
//! zero on load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Checkpoint, CheckpointerError};
use crate::message::Message;
use crate::state::ConversationState;

/// Persisted shape of [`ConversationState`]: messages only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Full persisted checkpoint representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedCheckpoint {
    pub thread_id: String,
    pub seq: u64,
    pub state: PersistedState,
    /// RFC 3339 creation time (keeps `chrono::DateTime` out of the
    /// serialized shape).
    pub created_at: String,
}

impl From<&ConversationState> for PersistedState {
    fn from(state: &ConversationState) -> Self {
        PersistedState {
            messages: state.messages.clone(),
        }
    }
}

impl From<PersistedState> for ConversationState {
    fn from(persisted: PersistedState) -> Self {
        ConversationState {
            messages: persisted.messages,
            iteration_count: 0,
        }
    }
}

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(checkpoint: &Checkpoint) -> Self {
        PersistedCheckpoint {
            thread_id: checkpoint.thread_id.clone(),
            seq: checkpoint.seq,
            state: PersistedState::from(&checkpoint.state),
            created_at: checkpoint.created_at.to_rfc3339(),
        }
    }
}

impl From<PersistedCheckpoint> for Checkpoint {
    fn from(persisted: PersistedCheckpoint) -> Self {
        let created_at = DateTime::parse_from_rfc3339(&persisted.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Checkpoint {
            thread_id: persisted.thread_id,
            seq: persisted.seq,
            state: ConversationState::from(persisted.state),
            created_at,
        }
    }
}

/// Serializes a persisted shape, mapping failures to the checkpoint error
/// taxonomy.
pub fn to_json<T: Serialize>(value: &T, what: &'static str) -> Result<String, CheckpointerError> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Serde {
        message: format!("{what}: {e}"),
    })
}

/// Deserializes a persisted shape, mapping failures to the checkpoint
/// error taxonomy.
pub fn from_json<T: for<'de> Deserialize<'de>>(
    json: &str,
    what: &'static str,
) -> Result<T, CheckpointerError> {
    serde_json::from_str(json).map_err(|e| CheckpointerError::Serde {
        message: format!("{what}: {e}"),
    })
}
