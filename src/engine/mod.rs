//! Graph execution engine for conversation turns.
//!
//! The engine has two layers, mirroring the table/driver split:
//!
//! - [`transition`] — the pure state machine: node identifiers, decision
//!   inputs, and the transition table. Testable exhaustively with no I/O.
//! - [`runner`] — [`TurnRunner`], which executes nodes against the model,
//!   tool registry, and checkpoint store.

pub mod runner;
pub mod transition;

pub use runner::{EngineError, PersistenceStatus, TurnOutcome, TurnRunner};
pub use transition::{TransitionInputs, TurnNode, next_node, should_force_reply};
