//! Async facades over the blocking infra and tools crates.

use crate::interfaces::{ConversationStore, RuntimeError, ToolDispatcher};
use crate::types::Message;
use async_trait::async_trait;
use palaver_infra::infra::conversation_log::{ConversationLog, ConversationLogError};
use std::sync::Arc;

fn store_error(e: ConversationLogError) -> RuntimeError {
    RuntimeError::StoreError(e.to_string())
}

/// Async wrapper for the file-backed conversation log.
pub struct AsyncConversationLog {
    inner: Arc<ConversationLog>,
}

impl AsyncConversationLog {
    pub fn new(inner: Arc<ConversationLog>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<ConversationLog> {
        &self.inner
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, RuntimeError>
    where
        T: Send + 'static,
        F: FnOnce(&ConversationLog) -> Result<T, ConversationLogError> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner).map_err(store_error))
            .await
            .map_err(|e| RuntimeError::StoreError(e.to_string()))?
    }
}

#[async_trait]
impl ConversationStore for AsyncConversationLog {
    async fn load(&self, conversation_id: &str) -> Result<Vec<Message>, RuntimeError> {
        let key = conversation_id.to_string();
        self.blocking(move |log| log.load::<Message>(&key)).await
    }

    async fn append_one(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), RuntimeError> {
        let key = conversation_id.to_string();
        let message = message.clone();
        self.blocking(move |log| log.append_one(&key, &message)).await
    }

    async fn append_many(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<(), RuntimeError> {
        let key = conversation_id.to_string();
        let messages = messages.to_vec();
        self.blocking(move |log| log.append_many(&key, &messages)).await
    }

    async fn replace(
        &self,
        conversation_id: &str,
        messages: &[Message],
    ) -> Result<(), RuntimeError> {
        let key = conversation_id.to_string();
        let messages = messages.to_vec();
        self.blocking(move |log| log.replace(&key, &messages)).await
    }
}

#[async_trait]
impl ToolDispatcher for palaver_tools::ToolDispatcherImpl {
    async fn execute(
        &self,
        conversation_id: &str,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> String {
        let _timer = crate::metrics::MetricTimer::new("tool_execution_latency");
        palaver_tools::ToolDispatcherImpl::execute(
            self,
            conversation_id,
            tool_name,
            arguments.clone(),
        )
        .await
    }

    fn schemas(&self) -> Vec<serde_json::Value> {
        palaver_tools::ToolDispatcherImpl::schemas(self)
    }
}
