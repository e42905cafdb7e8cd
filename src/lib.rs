//! Colloquy: a graph-driven conversation engine for tool-using chat
//! assistants.
//!
//! Each user turn runs through a small node graph — trim the context
//! window, optionally rewrite the query to stand alone, invoke the chat
//! model, dispatch any requested tools, and loop until the model answers
//! in plain text or an iteration guard forces a reply. Completed turns are
//! appended to a per-thread checkpoint store so conversations survive
//! process restarts.
//!
//! The seams are traits: [`models::ChatModel`] for the LLM backend,
//! [`tools::Tool`] for callable tools, [`tools::Retriever`] for document
//! search, and [`checkpoint::Checkpointer`] for persistence. The crate
//! ships an OpenAI-compatible model client, a small default tool set, and
//! in-memory plus SQLite checkpoint backends.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use colloquy::checkpoint::InMemoryCheckpointer;
//! use colloquy::config::EngineConfig;
//! use colloquy::engine::TurnRunner;
//! use colloquy::models::OpenAiChatModel;
//! use colloquy::tools::{CalculatorTool, ClockTool, ToolRegistry};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! colloquy::telemetry::init_tracing();
//!
//! let runner = TurnRunner::new(
//!     Arc::new(OpenAiChatModel::from_env()?),
//!     ToolRegistry::new().register(ClockTool).register(CalculatorTool),
//!     Arc::new(InMemoryCheckpointer::new()),
//!     EngineConfig::default(),
//! );
//!
//! let outcome = runner.run_turn("demo", "What time is it?").await?;
//! println!("{}", outcome.answer);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod message;
pub mod models;
pub mod rewrite;
pub mod state;
pub mod telemetry;
pub mod tools;
pub mod trim;
