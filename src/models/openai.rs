//! OpenAI-compatible chat-completions client.
//!
//! Works against any endpoint speaking the `/chat/completions` dialect
//! (OpenAI, DashScope, Ollama, vLLM, ...). Tool calls arrive with their
//! arguments as a JSON-encoded string; we parse them into structured
//! [`ToolCall`] values at the boundary so the rest of the engine never sees
//! wire quirks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use super::{ChatModel, ModelError, ToolSpec};
use crate::message::{Message, Role, ToolCall};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI-compatible providers.
#[derive(Clone, Debug)]
pub struct OpenAiChatModel {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
        }
    }

    /// Builds a client from `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `OPENAI_MODEL`, loading a `.env` file when present.
    pub fn from_env() -> Result<Self, ModelError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| ModelError::Request {
            message: "OPENAI_API_KEY is not set".to_string(),
        })?;
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        Ok(Self::new(base_url, api_key, model))
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/* ---------- wire types ---------- */

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolSpec,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    function: WireFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON object encoded as a string, per the chat-completions dialect.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

fn to_wire(message: &Message) -> WireMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: Some("function".to_string()),
                    function: WireFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };
    WireMessage {
        role: message.role.as_str().to_string(),
        content: Some(message.content.clone()),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn from_wire(wire: WireMessage) -> Message {
    let tool_calls = wire
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            // Providers occasionally emit arguments that are not valid JSON;
            // surface them as a string so the tool can report the problem.
            let arguments = serde_json::from_str::<Value>(&call.function.arguments)
                .unwrap_or(Value::String(call.function.arguments));
            ToolCall::new(call.id, call.function.name, arguments)
        })
        .collect();
    Message {
        role: Role::Assistant,
        content: wire.content.unwrap_or_default(),
        tool_calls,
        tool_call_id: None,
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %self.model, messages = messages.len(), tools = tools.len()), err)]
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, ModelError> {
        let request = WireRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            temperature: self.temperature,
            tools: tools
                .iter()
                .map(|spec| WireTool {
                    kind: "function",
                    function: spec,
                })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ModelError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ModelError::Request {
            message: e.to_string(),
        })?;
        if !status.is_success() {
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: WireResponse = serde_json::from_str(&body)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ModelError::EmptyResponse)?;
        Ok(from_wire(choice.message))
    }
}
