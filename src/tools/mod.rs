//! Tool registry and dispatcher.
//!
//! Tools are a closed registry built at startup: each implements the
//! [`Tool`] trait and is looked up by name when the model requests a call.
//! Dispatch is sequential and order-preserving; every requested call yields
//! exactly one tool-result message, in request order. Faults never abort
//! the turn: unknown names, argument errors, execution failures, and
//! timeouts are all converted to error-carrying tool results the model can
//! see and react to.

mod calculator;
mod clock;
mod retrieval;
mod web_search;

pub use calculator::CalculatorTool;
pub use clock::ClockTool;
pub use retrieval::{DocChunk, RetrievalTool, Retriever, RetrieverError};
pub use web_search::WebSearchTool;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{instrument, warn};

use crate::message::{Message, ToolCall};
use crate::models::ToolSpec;

/// Failures raised inside a tool. The dispatcher converts these to
/// error-carrying tool-result messages; they never propagate further.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    #[diagnostic(code(colloquy::tool::arguments))]
    InvalidArguments(String),

    #[error("{0}")]
    #[diagnostic(code(colloquy::tool::execution))]
    Execution(String),
}

/// A named external capability the model may invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name the model addresses this tool by.
    fn name(&self) -> &str;

    /// When-to-use guidance advertised to the model.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    /// Executes the tool. Side effects (network, filesystem) are the
    /// tool's own responsibility; the dispatcher performs no caching or
    /// retries.
    async fn invoke(&self, arguments: Value) -> Result<String, ToolError>;
}

/// Closed mapping from tool name to implementation, built at startup.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool. Re-registering a name replaces the previous
    /// implementation.
    #[must_use]
    pub fn register(mut self, tool: impl Tool + 'static) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_none() {
            self.order.push(name);
        }
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Specs for every registered tool, in registration order.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Executes the requested calls sequentially and returns one
    /// tool-result message per call, in request order.
    #[instrument(skip_all, fields(calls = calls.len()))]
    pub async fn dispatch(
        &self,
        calls: &[ToolCall],
        call_timeout: Option<Duration>,
    ) -> Vec<Message> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let content = match self.tools.get(&call.name) {
                None => {
                    warn!(tool = %call.name, "model requested unknown tool");
                    format!(
                        "error: unknown tool '{}'; available tools: {}",
                        call.name,
                        self.order.join(", ")
                    )
                }
                Some(tool) => {
                    let invocation = tool.invoke(call.arguments.clone());
                    let outcome = match call_timeout {
                        Some(limit) => match tokio::time::timeout(limit, invocation).await {
                            Ok(result) => result,
                            Err(_) => Err(ToolError::Execution(format!(
                                "timed out after {}s",
                                limit.as_secs()
                            ))),
                        },
                        None => invocation.await,
                    };
                    match outcome {
                        Ok(content) => content,
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool call failed");
                            format!("error running tool '{}': {e}", call.name)
                        }
                    }
                }
            };
            results.push(Message::tool_result(call.id.clone(), content));
        }
        results
    }
}
