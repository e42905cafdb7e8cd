//! The turn state machine: node identifiers and the transition table.
//!
//! Branching is expressed as a pure function over an enumerated node set
//! rather than ad hoc control flow, so the termination invariant can be
//! verified by testing the table exhaustively without touching the model
//! path. The runner evaluates [`next_node`] after executing each node until
//! a terminal node is reached.
//!
//! ```text
//! Trim → (Rewrite?) → Agent ─┬─ no tool calls ──────────────→ Reply
//!                            ├─ tool calls, under budget ──→ Tools → Increment → Agent
//!                            └─ tool calls, budget spent ──→ ForceReply
//! ```

use std::fmt;

/// Nodes of the per-turn execution graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TurnNode {
    /// Window the full history for the model (always first).
    Trim,
    /// Rewrite an ambiguous query for retrieval (conditional).
    Rewrite,
    /// Invoke the model with the current window.
    Agent,
    /// Dispatch the requested tool calls.
    Tools,
    /// Count one completed tool round, then loop to Agent.
    Increment,
    /// Terminal: synthesize an answer without further tool dispatch.
    ForceReply,
    /// Terminal: the model answered directly.
    Reply,
}

impl TurnNode {
    /// Terminal nodes end the turn; [`next_node`] returns `None` for them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TurnNode::Reply | TurnNode::ForceReply)
    }
}

impl fmt::Display for TurnNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnNode::Trim => "trim",
            TurnNode::Rewrite => "rewrite",
            TurnNode::Agent => "agent",
            TurnNode::Tools => "tools",
            TurnNode::Increment => "increment",
            TurnNode::ForceReply => "force_reply",
            TurnNode::Reply => "reply",
        };
        f.write_str(name)
    }
}

/// Decision predicates the transition table consults.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransitionInputs {
    /// The latest user query was judged ambiguous by the rewrite heuristic.
    pub needs_rewrite: bool,
    /// The last model output carries unserved tool-call requests.
    pub pending_tool_calls: bool,
    /// Tool rounds consumed so far this turn.
    pub iteration_count: u32,
    /// Configured tool-round budget.
    pub max_iterations: u32,
}

/// Iteration-guard policy: once this trips, the engine must reach a
/// terminal node without further tool dispatch.
#[must_use]
pub fn should_force_reply(iteration_count: u32, max_iterations: u32) -> bool {
    iteration_count >= max_iterations
}

/// The transition table. Returns `None` from terminal nodes.
#[must_use]
pub fn next_node(current: TurnNode, inputs: TransitionInputs) -> Option<TurnNode> {
    match current {
        TurnNode::Trim => Some(if inputs.needs_rewrite {
            TurnNode::Rewrite
        } else {
            TurnNode::Agent
        }),
        TurnNode::Rewrite => Some(TurnNode::Agent),
        TurnNode::Agent => Some(if !inputs.pending_tool_calls {
            TurnNode::Reply
        } else if should_force_reply(inputs.iteration_count, inputs.max_iterations) {
            TurnNode::ForceReply
        } else {
            TurnNode::Tools
        }),
        TurnNode::Tools => Some(TurnNode::Increment),
        TurnNode::Increment => Some(TurnNode::Agent),
        TurnNode::ForceReply | TurnNode::Reply => None,
    }
}
