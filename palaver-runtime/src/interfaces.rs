//! Abstract interfaces for runtime dependencies.

use crate::types::{Message, ModelResponse};
use async_trait::async_trait;
use thiserror::Error;

/// Runtime errors.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("LLM error: {0}")]
    LLMError(String),

    #[error("Summary error: {0}")]
    SummaryError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Durable per-conversation message storage.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Load message history; empty if the conversation has never been written.
    async fn load(&self, conversation_id: &str) -> Result<Vec<Message>, RuntimeError>;

    /// Durably append one message.
    async fn append_one(&self, conversation_id: &str, message: &Message)
        -> Result<(), RuntimeError>;

    /// Durably append a batch that becomes visible as a unit.
    async fn append_many(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<(), RuntimeError>;

    /// Atomically overwrite the whole history.
    async fn replace(&self, conversation_id: &str, messages: &[Message])
        -> Result<(), RuntimeError>;
}

/// Tool execution interface. Never fails: every outcome is a string.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn execute(
        &self,
        conversation_id: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> String;

    /// Tool schemas in OpenAI function format, in registration order.
    fn schemas(&self) -> Vec<serde_json::Value>;
}

/// Language-model backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        history: &[Message],
        tool_schemas: &[serde_json::Value],
    ) -> Result<ModelResponse, RuntimeError>;
}

/// Turns a compaction prompt into a summary.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String, RuntimeError>;
}

/// Observes each tool call after it completes. Purely informational.
pub trait ToolObserver: Send + Sync {
    fn on_tool_use(&self, tool_name: &str, arguments: &serde_json::Value, result: &str);
}

impl<F> ToolObserver for F
where
    F: Fn(&str, &serde_json::Value, &str) + Send + Sync,
{
    fn on_tool_use(&self, tool_name: &str, arguments: &serde_json::Value, result: &str) {
        self(tool_name, arguments, result)
    }
}

/// Single entry point shared by every front-end.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, conversation_id: &str, text: &str) -> Result<String, RuntimeError>;
}
