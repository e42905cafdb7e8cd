//! Turn execution: drives one user turn through the node graph.
//!
//! [`TurnRunner`] owns the collaborators (model, tool registry, checkpoint
//! store, rewriter) and executes the transition table from
//! [`transition`](super::transition) one node at a time over a single
//! [`ConversationState`]. One call to [`run_turn`](TurnRunner::run_turn) is
//! one complete request/response cycle: load the thread, append the user
//! message, loop until a terminal node, commit exactly one checkpoint.
//!
//! Fault policy (in order of severity):
//! - tool and rewrite faults are absorbed inside their nodes;
//! - the iteration guard converts a runaway tool loop into a forced reply;
//! - a failed model call aborts the turn with nothing committed;
//! - a failed checkpoint write still returns the answer, flagged unsaved.

use std::sync::Arc;

use chrono::Utc;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::transition::{TransitionInputs, TurnNode, next_node};
use crate::checkpoint::{Checkpoint, Checkpointer, CheckpointerError};
use crate::config::EngineConfig;
use crate::message::{Message, Role};
use crate::models::{ChatModel, ModelError, ToolSpec};
use crate::rewrite::QueryRewriter;
use crate::state::ConversationState;
use crate::tools::ToolRegistry;
use crate::trim::trim_window;

/// Answer returned when even the forced-reply model call fails. The turn
/// must still terminate with some answer.
const FORCED_FALLBACK: &str =
    "I gathered some information but could not finish composing an answer. \
     Please try rephrasing your question.";

/// Turn-level failures. Anything here means the turn was not committed and
/// the thread's previously persisted state is untouched.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(code(colloquy::engine::model))]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(code(colloquy::engine::checkpoint))]
    Checkpoint(#[from] CheckpointerError),

    /// The turn reached a terminal node without any assistant output.
    /// Indicates a model implementation violating its contract.
    #[error("turn terminated without producing an assistant message")]
    #[diagnostic(code(colloquy::engine::no_answer))]
    NoAnswer,
}

/// Whether the completed turn was durably saved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceStatus {
    /// Checkpoint committed under this sequence number.
    Saved { seq: u64 },
    /// The answer is valid but was not durably saved.
    Failed { reason: String },
}

impl PersistenceStatus {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, PersistenceStatus::Saved { .. })
    }
}

/// Result of one completed turn.
#[derive(Clone, Debug)]
pub struct TurnOutcome {
    /// Final assistant answer text.
    pub answer: String,
    /// Durability of this turn's checkpoint. A `Failed` status must be
    /// surfaced to the user as a warning, never swallowed.
    pub persistence: PersistenceStatus,
}

/// The conversation engine: graph-structured turn execution over
/// checkpointed threads.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use colloquy::checkpoint::InMemoryCheckpointer;
/// use colloquy::config::EngineConfig;
/// use colloquy::engine::TurnRunner;
/// use colloquy::models::OpenAiChatModel;
/// use colloquy::tools::{CalculatorTool, ClockTool, ToolRegistry};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let model = Arc::new(OpenAiChatModel::from_env()?);
/// let tools = ToolRegistry::new()
///     .register(ClockTool)
///     .register(CalculatorTool);
/// let runner = TurnRunner::new(
///     model,
///     tools,
///     Arc::new(InMemoryCheckpointer::new()),
///     EngineConfig::default().with_system_prompt("You answer from the document index."),
/// );
///
/// let outcome = runner.run_turn("thread-1", "What is 2 ** 10?").await?;
/// println!("{}", outcome.answer);
/// # Ok(())
/// # }
/// ```
pub struct TurnRunner {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    checkpointer: Arc<dyn Checkpointer>,
    rewriter: QueryRewriter,
    config: EngineConfig,
}

impl TurnRunner {
    #[must_use]
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        checkpointer: Arc<dyn Checkpointer>,
        config: EngineConfig,
    ) -> Self {
        let rewriter = QueryRewriter::new(model.clone(), config.rewrite.clone());
        Self {
            model,
            tools,
            checkpointer,
            rewriter,
            config,
        }
    }

    /// Runs one user turn to completion for `thread_id`.
    ///
    /// Terminates after at most `max_iterations` tool rounds; the model is
    /// invoked at most `max_iterations + 1` times with tools available,
    /// plus at most one tool-free forced-reply call.
    #[instrument(skip(self, user_text), err)]
    pub async fn run_turn(
        &self,
        thread_id: &str,
        user_text: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let latest = self.checkpointer.load_latest(thread_id).await?;
        let prev_seq = latest.as_ref().map_or(0, |c| c.seq);
        let mut state = latest.map_or_else(ConversationState::new, |c| c.state);
        state.begin_turn(user_text);

        // The window is this turn's working view: trimmed once up front,
        // then appended to in lockstep with the full history. The full
        // history in `state` is never trimmed.
        let mut window: Vec<Message> = Vec::new();
        let mut needs_rewrite = false;
        let mut node = TurnNode::Trim;

        loop {
            debug!(node = %node, iteration = state.iteration_count, "executing node");
            match node {
                TurnNode::Trim => {
                    window = trim_window(&state.messages, self.config.window_size);
                    if let Some(prompt) = &self.config.system_prompt
                        && !window.iter().any(|m| m.has_role(Role::System))
                    {
                        window.insert(0, Message::system(prompt.clone()));
                    }
                    needs_rewrite = state.last_user_message().is_some_and(|m| {
                        self.rewriter
                            .needs_rewrite(&m.content, state.has_prior_turns())
                    });
                }
                TurnNode::Rewrite => {
                    self.rewrite_window_query(&mut window).await;
                }
                TurnNode::Agent => {
                    let specs = self.tools.specs();
                    let response = self.invoke_model(&window, &specs).await?;
                    window.push(response.clone());
                    state.push(response);
                }
                TurnNode::Tools => {
                    let calls = state
                        .last_assistant_message()
                        .map(|m| m.tool_calls.clone())
                        .unwrap_or_default();
                    let results = self
                        .tools
                        .dispatch(&calls, self.config.call_timeout)
                        .await;
                    window.extend(results.iter().cloned());
                    for result in results {
                        state.push(result);
                    }
                }
                TurnNode::Increment => {
                    state.iteration_count += 1;
                }
                TurnNode::ForceReply => {
                    let answer = self.force_reply(&window).await;
                    state.push(answer);
                }
                TurnNode::Reply => {
                    // The final assistant message was appended at the Agent
                    // node; nothing left to execute.
                }
            }

            let inputs = TransitionInputs {
                needs_rewrite,
                pending_tool_calls: state.messages.last().is_some_and(Message::requests_tools),
                iteration_count: state.iteration_count,
                max_iterations: self.config.max_iterations,
            };
            match next_node(node, inputs) {
                Some(next) => node = next,
                None => break,
            }
        }

        let answer = state
            .last_assistant_message()
            .map(|m| m.content.clone())
            .ok_or(EngineError::NoAnswer)?;

        let checkpoint = Checkpoint {
            thread_id: thread_id.to_string(),
            seq: prev_seq + 1,
            state,
            created_at: Utc::now(),
        };
        let persistence = match self.checkpointer.append(checkpoint).await {
            Ok(()) => PersistenceStatus::Saved { seq: prev_seq + 1 },
            Err(e) => {
                warn!(error = %e, thread_id, "checkpoint write failed; turn not durably saved");
                PersistenceStatus::Failed {
                    reason: e.to_string(),
                }
            }
        };

        Ok(TurnOutcome {
            answer,
            persistence,
        })
    }

    /// All persisted thread identifiers.
    pub async fn threads(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.checkpointer.list_threads().await?)
    }

    /// Explicitly destroys a thread and its entire checkpoint history.
    pub async fn delete_thread(&self, thread_id: &str) -> Result<(), EngineError> {
        Ok(self.checkpointer.delete_thread(thread_id).await?)
    }

    /// Replaces the content of the window's latest user message with a
    /// self-contained rewrite. Only the window changes; the stored history
    /// keeps the original wording.
    async fn rewrite_window_query(&self, window: &mut [Message]) {
        let Some(index) = window.iter().rposition(|m| m.has_role(Role::User)) else {
            return;
        };
        let original = window[index].content.clone();
        let rewritten = self.rewriter.rewrite(&original, &window[..index]).await;
        window[index].content = rewritten;
    }

    async fn invoke_model(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, self.model.invoke(messages, tools))
                .await
                .map_err(|_| ModelError::Timeout {
                    seconds: limit.as_secs(),
                })?,
            None => self.model.invoke(messages, tools).await,
        }
    }

    /// Synthesizes a final answer once the iteration guard has tripped.
    /// Re-invokes the model with no tools bound and an instruction to
    /// answer from what was already gathered; degrades to a fixed fallback
    /// so the turn terminates even if that call fails.
    async fn force_reply(&self, window: &[Message]) -> Message {
        let mut prompt = window.to_vec();
        prompt.push(Message::system(format!(
            "You have already used {} rounds of tools. Answer the user's \
             question now using only the information gathered above. Do not \
             request any more tools.",
            self.config.max_iterations
        )));
        match self.invoke_model(&prompt, &[]).await {
            Ok(mut answer) => {
                if answer.content.trim().is_empty() {
                    answer.content = FORCED_FALLBACK.to_string();
                }
                // Strip any tool calls the model emitted anyway; the guard
                // has tripped and nothing will dispatch them.
                answer.tool_calls.clear();
                answer
            }
            Err(e) => {
                warn!(error = %e, "forced-reply model call failed, using fallback answer");
                Message::assistant(FORCED_FALLBACK)
            }
        }
    }
}
