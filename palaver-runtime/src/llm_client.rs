//! OpenAI-compatible chat-completions client.

use crate::interfaces::{ModelClient, RuntimeError, Summarizer};
use crate::types::{Message, ModelResponse, Role, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_MAX_TOKENS: u32 = 4096;
const SUMMARY_MAX_TOKENS: u32 = 2048;
const SUMMARIZER_SYSTEM_PROMPT: &str = "You are a precise conversation summarizer.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Value]>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Client for any backend speaking the OpenAI chat-completions protocol.
#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    base_url: String,
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl OpenAiCompatibleClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL, e.g. `https://api.openai.com/v1`
    /// * `model` - Model identifier sent with every request
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into(),
            client,
            api_key: None,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: Vec<Value>,
        tools: Option<&[Value]>,
        max_tokens: u32,
    ) -> Result<ChatMessage, RuntimeError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages,
            tools,
            max_tokens,
        };

        debug!("llm url={}", url);
        debug!("llm tools_count={}", tools.map(|t| t.len()).unwrap_or(0));

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                RuntimeError::LLMError(format!("Network connection failed: {}", e))
            } else {
                RuntimeError::LLMError(format!("HTTP request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());

            let error_msg = match status.as_u16() {
                401 => format!(
                    "Authentication failed (401 Unauthorized). Check your API key. Details: {}",
                    error_body
                ),
                404 => format!("Invalid endpoint (404 Not Found). Details: {}", error_body),
                429 => format!(
                    "Rate limit exceeded (429 Too Many Requests). Details: {}",
                    error_body
                ),
                500..=599 => format!("Server error: {}. Details: {}", status, error_body),
                _ => format!("HTTP error: {}. Details: {}", status, error_body),
            };
            return Err(RuntimeError::LLMError(error_msg));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RuntimeError::LLMError(format!("Failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| RuntimeError::LLMError("No choices in response".to_string()))
    }
}

/// Encode one stored message in the OpenAI wire shape.
pub fn encode_message(msg: &Message) -> Value {
    match msg.role {
        Role::Assistant if msg.has_tool_calls() => {
            let calls: Vec<Value> = msg
                .tool_calls
                .iter()
                .map(|call| {
                    json!({
                        "id": call.id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": serde_json::to_string(&call.arguments)
                                .unwrap_or_else(|_| "{}".to_string()),
                        }
                    })
                })
                .collect();
            json!({"role": "assistant", "content": msg.content, "tool_calls": calls})
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id.as_deref().unwrap_or(""),
            "content": msg.text(),
        }),
        Role::System => json!({"role": "system", "content": msg.text()}),
        Role::User => json!({"role": "user", "content": msg.text()}),
        Role::Assistant => json!({"role": "assistant", "content": msg.text()}),
    }
}

/// Arguments arrive as a JSON-encoded string; anything unparsable becomes `{}`.
fn decode_arguments(raw: Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(&s).unwrap_or_else(|_| json!({})),
        Value::Object(_) => raw,
        _ => json!({}),
    }
}

fn into_response(message: ChatMessage) -> ModelResponse {
    let calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            let id = if call.id.is_empty() {
                format!("call_{}", i)
            } else {
                call.id
            };
            ToolCall::new(id, call.function.name, decode_arguments(call.function.arguments))
        })
        .collect();

    if calls.is_empty() {
        ModelResponse::Text(message.content.unwrap_or_default())
    } else {
        ModelResponse::ToolCalls {
            content: message.content.filter(|c| !c.is_empty()),
            calls,
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tool_schemas: &[Value],
    ) -> Result<ModelResponse, RuntimeError> {
        let _timer = crate::metrics::MetricTimer::new("llm_request_latency");

        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(json!({"role": "system", "content": system_prompt}));
        }
        messages.extend(history.iter().map(encode_message));

        let tools = if tool_schemas.is_empty() {
            None
        } else {
            Some(tool_schemas)
        };

        let message = self.chat(messages, tools, self.max_tokens).await?;
        Ok(into_response(message))
    }
}

/// Summarizer backed by the same chat endpoint, without tools.
pub struct ChatSummarizer {
    client: Arc<OpenAiCompatibleClient>,
}

impl ChatSummarizer {
    pub fn new(client: Arc<OpenAiCompatibleClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Summarizer for ChatSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, RuntimeError> {
        let messages = vec![
            json!({"role": "system", "content": SUMMARIZER_SYSTEM_PROMPT}),
            json!({"role": "user", "content": prompt}),
        ];

        let message = self
            .client
            .chat(messages, None, SUMMARY_MAX_TOKENS)
            .await
            .map_err(|e| RuntimeError::SummaryError(e.to_string()))?;

        Ok(message.content.unwrap_or_default())
    }
}
