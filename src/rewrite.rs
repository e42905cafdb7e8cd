//! Query rewriting for retrieval quality.
//!
//! Short or anaphoric user queries ("what about the second one?") retrieve
//! poorly. When the heuristic fires, the rewriter asks the model for a
//! self-contained restatement. The rewritten text is substituted only into
//! the window sent downstream for this call; the stored history keeps the
//! user's original words. Any failure here degrades to the original query
//! rather than aborting the turn.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::RewriteConfig;
use crate::message::{Message, Role};
use crate::models::ChatModel;

const REWRITE_PROMPT: &str = "You rewrite user questions into precise, self-contained search \
     queries. Rules: output only the rewritten question, with no explanation. \
     If the question is already clear, output it unchanged. Keep the user's \
     language. Resolve pronouns and references using the conversation \
     context provided.";

/// How many trailing window messages are offered as context for resolving
/// references.
const CONTEXT_MESSAGES: usize = 6;

/// Decides whether the latest user query needs rewriting and performs the
/// rewrite through the model.
#[derive(Clone)]
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
    config: RewriteConfig,
}

impl QueryRewriter {
    #[must_use]
    pub fn new(model: Arc<dyn ChatModel>, config: RewriteConfig) -> Self {
        Self { model, config }
    }

    /// Deterministic trigger heuristic.
    ///
    /// Fires for queries shorter than the configured threshold, or for
    /// queries containing an anaphora marker as a standalone word when
    /// prior turns exist for the reference to point at.
    #[must_use]
    pub fn needs_rewrite(&self, query: &str, has_prior_turns: bool) -> bool {
        if !self.config.enabled {
            return false;
        }
        let query = query.trim();
        if query.is_empty() {
            return false;
        }
        if query.chars().count() < self.config.min_chars {
            return true;
        }
        if !has_prior_turns {
            return false;
        }
        let lowered = query.to_lowercase();
        lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|word| self.config.anaphora_markers.iter().any(|m| m == word))
    }

    /// Produces a self-contained rewrite of `original`, falling back to the
    /// original text on any model failure or empty output.
    pub async fn rewrite(&self, original: &str, context: &[Message]) -> String {
        let mut prompt = vec![Message::system(REWRITE_PROMPT)];
        let recent: Vec<&Message> = context
            .iter()
            .filter(|m| m.has_role(Role::User) || m.has_role(Role::Assistant))
            .rev()
            .take(CONTEXT_MESSAGES)
            .collect();
        prompt.extend(recent.into_iter().rev().cloned());
        prompt.push(Message::user(format!("Original question: {original}")));

        match self.model.invoke(&prompt, &[]).await {
            Ok(response) => {
                let rewritten = response.content.trim();
                if rewritten.is_empty() {
                    original.to_string()
                } else {
                    if rewritten != original {
                        debug!(%original, %rewritten, "query rewritten");
                    }
                    rewritten.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "query rewrite failed, using original query");
                original.to_string()
            }
        }
    }
}
