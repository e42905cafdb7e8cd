//! Knowledge-retrieval tool boundary.
//!
//! The document index itself (ingestion, chunking, embeddings, vector
//! search) lives outside this crate. [`Retriever`] is the seam: any index
//! implements it, and [`RetrievalTool`] adapts it into the uniform tool
//! surface so the model addresses retrieval exactly like every other tool.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;
use tracing::instrument;

use super::{Tool, ToolError};

/// A scored chunk returned from the document index.
#[derive(Clone, Debug, PartialEq)]
pub struct DocChunk {
    /// Where the chunk came from (file path, URL, document title).
    pub source: String,
    /// Chunk text.
    pub content: String,
    /// Similarity score, higher is better.
    pub score: f32,
}

/// Failures from the underlying document index.
#[derive(Debug, Error, Diagnostic)]
pub enum RetrieverError {
    #[error("retrieval backend error: {0}")]
    #[diagnostic(code(colloquy::retriever::backend))]
    Backend(String),
}

/// Search over a private document collection.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<DocChunk>, RetrieverError>;
}

/// Exposes a [`Retriever`] as a tool named `search_documents`.
#[derive(Clone)]
pub struct RetrievalTool {
    retriever: Arc<dyn Retriever>,
    top_k: usize,
}

impl RetrievalTool {
    /// Default number of chunks returned per query.
    pub const DEFAULT_TOP_K: usize = 4;

    #[must_use]
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            top_k: Self::DEFAULT_TOP_K,
        }
    }

    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        "search_documents"
    }

    fn description(&self) -> &str {
        "Search the private document collection for passages relevant to a \
         query. Use this before answering questions about the user's own \
         documents."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Self-contained search query"
                }
            },
            "required": ["query"]
        })
    }

    #[instrument(skip_all, err)]
    async fn invoke(&self, arguments: Value) -> Result<String, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("expected a 'query' string".to_string()))?;

        let chunks = self
            .retriever
            .search(query, self.top_k)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        if chunks.is_empty() {
            return Ok(format!("no documents matched '{query}'"));
        }
        Ok(chunks
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] ({}) {}", i + 1, c.source, c.content))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}
