//! Conversation state: the unit of turn execution and checkpointing.
//!
//! [`ConversationState`] owns the full, untrimmed message history of one
//! thread plus the per-turn tool-iteration counter. The engine appends to it
//! during a turn and hands the completed state to the checkpoint store;
//! nothing ever reorders or rewrites committed messages.

use miette::Diagnostic;
use thiserror::Error;

use crate::message::{Message, Role};

/// Full conversation history plus the per-turn iteration counter.
///
/// `iteration_count` tracks tool-invocation rounds within the current user
/// turn only. It resets in [`begin_turn`](Self::begin_turn) and is not
/// persisted across turns; a state loaded from a checkpoint always starts
/// the next turn at zero.
///
/// # Examples
///
/// ```
/// use colloquy::state::ConversationState;
///
/// let mut state = ConversationState::new_with_user_message("Hello!");
/// assert_eq!(state.messages.len(), 1);
/// assert_eq!(state.iteration_count, 0);
///
/// state.begin_turn("And another thing...");
/// assert_eq!(state.messages.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConversationState {
    /// Ordered message history. Append-only within a turn; insertion order
    /// is conversation order.
    pub messages: Vec<Message>,
    /// Tool-invocation rounds consumed in the current turn.
    pub iteration_count: u32,
}

/// Contract violations detectable on a state's message history.
#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    /// A tool-result message references a call id no prior assistant
    /// message requested.
    #[error("dangling tool result: no prior tool call with id {tool_call_id}")]
    #[diagnostic(
        code(colloquy::state::dangling_tool_result),
        help("Tool results must follow an assistant message that requested the call.")
    )]
    DanglingToolResult { tool_call_id: String },

    /// A tool-result message is missing its back-reference entirely.
    #[error("tool result at index {index} has no tool_call_id")]
    #[diagnostic(code(colloquy::state::missing_tool_call_id))]
    MissingToolCallId { index: usize },
}

impl ConversationState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state seeded with a single user message.
    #[must_use]
    pub fn new_with_user_message(user_text: &str) -> Self {
        Self {
            messages: vec![Message::user(user_text)],
            iteration_count: 0,
        }
    }

    /// Creates a state from an existing message history.
    #[must_use]
    pub fn new_with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            iteration_count: 0,
        }
    }

    /// Starts a new user turn: appends the user message and resets the
    /// iteration counter.
    pub fn begin_turn(&mut self, user_text: &str) {
        self.messages.push(Message::user(user_text));
        self.iteration_count = 0;
    }

    /// Appends a message to the history.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The most recent user message, if any.
    #[must_use]
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.has_role(Role::User))
    }

    /// The most recent assistant message, if any.
    #[must_use]
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.has_role(Role::Assistant))
    }

    /// True when the history contains messages from more than the current
    /// user turn, i.e. the rewrite heuristic has prior context to resolve
    /// anaphora against.
    #[must_use]
    pub fn has_prior_turns(&self) -> bool {
        self.messages
            .iter()
            .filter(|m| !m.has_role(Role::System))
            .count()
            > 1
    }

    /// Verifies the tool-result invariant: every tool message refers back to
    /// a tool call previously requested by an assistant message.
    pub fn validate(&self) -> Result<(), StateError> {
        let mut known_call_ids: Vec<&str> = Vec::new();
        for (index, message) in self.messages.iter().enumerate() {
            match message.role {
                Role::Assistant => {
                    known_call_ids.extend(message.tool_calls.iter().map(|c| c.id.as_str()));
                }
                Role::Tool => {
                    let id = message
                        .tool_call_id
                        .as_deref()
                        .ok_or(StateError::MissingToolCallId { index })?;
                    if !known_call_ids.contains(&id) {
                        return Err(StateError::DanglingToolResult {
                            tool_call_id: id.to_string(),
                        });
                    }
                }
                Role::User | Role::System => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;
    use serde_json::json;

    #[test]
    fn begin_turn_resets_iteration_count() {
        let mut state = ConversationState::new_with_user_message("first");
        state.iteration_count = 4;
        state.begin_turn("second");
        assert_eq!(state.iteration_count, 0);
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn last_user_message_skips_later_roles() {
        let mut state = ConversationState::new_with_user_message("question");
        state.push(Message::assistant("answer"));
        assert_eq!(state.last_user_message().unwrap().content, "question");
    }

    #[test]
    fn validate_accepts_matched_tool_results() {
        let mut state = ConversationState::new_with_user_message("q");
        state.push(Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("call_1", "clock", json!({}))],
        ));
        state.push(Message::tool_result("call_1", "2026-08-30"));
        assert!(state.validate().is_ok());
    }

    #[test]
    fn validate_rejects_dangling_tool_result() {
        let mut state = ConversationState::new_with_user_message("q");
        state.push(Message::tool_result("nope", "orphan"));
        assert!(matches!(
            state.validate(),
            Err(StateError::DanglingToolResult { .. })
        ));
    }

    #[test]
    fn has_prior_turns_ignores_system_messages() {
        let mut state = ConversationState::new();
        state.push(Message::system("prompt"));
        state.push(Message::user("only turn"));
        assert!(!state.has_prior_turns());
        state.push(Message::assistant("reply"));
        assert!(state.has_prior_turns());
    }
}
