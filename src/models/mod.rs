//! Model abstraction: the engine's view of a chat-completion provider.
//!
//! The engine treats the model as an opaque function from a message window
//! (plus available tool specs) to one assistant message. Everything
//! provider-specific lives behind [`ChatModel`]; the bundled
//! [`OpenAiChatModel`] speaks the OpenAI-compatible chat-completions wire
//! format with tool calling.

mod openai;

pub use openai::OpenAiChatModel;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;

/// Description of a callable tool, advertised to the model.
#[derive(Clone, Debug, Serialize)]
pub struct ToolSpec {
    /// Registered tool name the model must use in tool calls.
    pub name: String,
    /// When-to-use guidance shown to the model.
    pub description: String,
    /// JSON schema of the tool's arguments object.
    pub parameters: Value,
}

/// Errors from the model boundary. All of these are fatal for the turn;
/// the engine propagates them without committing a checkpoint.
#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("model request failed: {message}")]
    #[diagnostic(
        code(colloquy::model::request),
        help("Check network connectivity and the configured base URL.")
    )]
    Request { message: String },

    #[error("model returned status {status}: {message}")]
    #[diagnostic(
        code(colloquy::model::api),
        help("Inspect the provider error body; auth and quota failures surface here.")
    )]
    Api { status: u16, message: String },

    #[error("model response could not be decoded: {0}")]
    #[diagnostic(code(colloquy::model::decode))]
    Decode(#[from] serde_json::Error),

    #[error("model response carried no choices")]
    #[diagnostic(code(colloquy::model::empty))]
    EmptyResponse,

    #[error("model call exceeded the configured timeout of {seconds}s")]
    #[diagnostic(
        code(colloquy::model::timeout),
        help("Raise EngineConfig::call_timeout or leave it unset to block.")
    )]
    Timeout { seconds: u64 },
}

/// An opaque chat-completion call.
///
/// Implementations must be side-effect-free from the engine's perspective
/// apart from network cost. Passing an empty `tools` slice asks for a plain
/// text completion with no tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[Message], tools: &[ToolSpec])
    -> Result<Message, ModelError>;
}
