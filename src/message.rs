//! Conversation messages and tool-call requests.
//!
//! [`Message`] is the primary data structure flowing through the engine:
//! user input, assistant replies (optionally carrying tool-call requests),
//! system prompts, and tool results. Messages serialize with serde so the
//! same shape is used in memory, in checkpoints, and on the model wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The sender of a [`Message`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System prompt or instruction.
    System,
    /// End-user input.
    User,
    /// Model output, possibly carrying tool-call requests.
    Assistant,
    /// Result of a dispatched tool call.
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured request, emitted by the model, to invoke a named tool.
///
/// `arguments` is kept as raw JSON; each tool interprets it against its own
/// parameter schema at dispatch time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier the tool result must echo back via `tool_call_id`.
    pub id: String,
    /// Registered tool name.
    pub name: String,
    /// Tool arguments as a JSON object.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// A message in a conversation.
///
/// # Examples
///
/// ```
/// use colloquy::message::{Message, Role};
///
/// let user = Message::user("What's in the quarterly report?");
/// assert!(user.has_role(Role::User));
///
/// let reply = Message::assistant("The report covers Q3 revenue.");
/// assert!(!reply.requests_tools());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,
    /// Text content. May be empty for assistant messages that only
    /// request tools.
    pub content: String,
    /// Tool-call requests attached to an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Back-reference to the originating [`ToolCall::id`] on tool results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a plain message with the given role and content.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message with no tool calls (a final answer).
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates an assistant message carrying tool-call requests.
    #[must_use]
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a tool-result message referencing the originating call.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Returns true if this is an assistant message requesting tool calls.
    #[must_use]
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }
}
