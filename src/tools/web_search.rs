//! DuckDuckGo HTML search tool.
//!
//! Posts the query to the no-JavaScript HTML endpoint and extracts the top
//! result snippets with `scraper`. Network and parse failures surface as
//! [`ToolError`]s, which the dispatcher converts into error-carrying tool
//! results.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::instrument;

use super::{Tool, ToolError};

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_SNIPPETS: usize = 5;

/// Web search over DuckDuckGo's HTML endpoint.
#[derive(Clone, Debug)]
pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .user_agent("Mozilla/5.0")
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

fn extract_snippets(body: &str) -> Result<Vec<String>, ToolError> {
    let selector = Selector::parse(".result__snippet")
        .map_err(|e| ToolError::Execution(format!("snippet selector: {e}")))?;
    // Html is parsed and dropped synchronously; it is not Send and must not
    // live across an await point.
    let document = Html::parse_document(body);
    Ok(document
        .select(&selector)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .take(MAX_SNIPPETS)
        .collect())
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web via DuckDuckGo. Use for current events, facts you are \
         unsure about, or anything requiring up-to-date information. Returns a \
         summary of the top results."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
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

        let response = self
            .client
            .post(SEARCH_URL)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("search request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ToolError::Execution(format!("search returned error: {e}")))?;
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Execution(format!("search body read failed: {e}")))?;

        let snippets = extract_snippets(&body)?;
        if snippets.is_empty() {
            return Ok(format!("no search results found for '{query}'"));
        }
        Ok(snippets
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {s}", i + 1))
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
