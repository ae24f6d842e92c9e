//! Agent loop - the turn execution engine.
//!
//! One turn runs through `Loading -> Sanitizing -> Compacting -> Appending ->
//! Iterating(n)` and ends in `Done` or `MaxIterationsReached`. Every state
//! change that matters for recovery is persisted before the next step starts:
//! the user message before the first model call, and each assistant tool-call
//! message together with all of its results.

use crate::compactor::{Compaction, Compactor};
use crate::history;
use crate::interfaces::{
    ConversationStore, ModelClient, RuntimeError, Summarizer, ToolDispatcher, ToolObserver,
};
use crate::types::{Message, ModelResponse};
use palaver_infra::infra::turn_serializer::{TurnGuard, TurnSerializer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Returned when a turn uses up its iterations without a final answer.
pub const MAX_ITERATIONS_SENTINEL: &str = "(max tool turns reached)";

pub const DEFAULT_MAX_ITERATIONS: usize = 20;

/// Phases of a single turn, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Loading,
    Sanitizing,
    Compacting,
    Appending,
    Iterating(usize),
    Done,
    MaxIterationsReached,
}

/// Core agent execution loop.
pub struct AgentLoop<S, D, M, Sum>
where
    S: ConversationStore,
    D: ToolDispatcher,
    M: ModelClient,
    Sum: Summarizer,
{
    store: Arc<S>,
    serializer: Arc<TurnSerializer>,
    dispatcher: Arc<D>,
    model: Arc<M>,
    compactor: Compactor<Sum>,
    max_iterations: usize,
    lock_timeout: Option<Duration>,
    observer: Option<Arc<dyn ToolObserver>>,
    concurrency_limiter: Option<Arc<Semaphore>>,
}

impl<S, D, M, Sum> AgentLoop<S, D, M, Sum>
where
    S: ConversationStore,
    D: ToolDispatcher,
    M: ModelClient,
    Sum: Summarizer,
{
    /// Create a new agent loop.
    pub fn new(
        store: Arc<S>,
        serializer: Arc<TurnSerializer>,
        dispatcher: Arc<D>,
        model: Arc<M>,
        compactor: Compactor<Sum>,
        max_iterations: usize,
    ) -> Self {
        Self {
            store,
            serializer,
            dispatcher,
            model,
            compactor,
            max_iterations,
            lock_timeout: None,
            observer: None,
            concurrency_limiter: None,
        }
    }

    /// Fail a turn with `LockError` instead of waiting forever for a busy
    /// conversation.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Cap the number of turns executing at once. A permit is taken only
    /// after the conversation lock, so turns queued on one conversation do
    /// not hold permits.
    pub fn with_concurrency_limiter(mut self, limiter: Arc<Semaphore>) -> Self {
        self.concurrency_limiter = Some(limiter);
        self
    }

    pub fn serializer(&self) -> &Arc<TurnSerializer> {
        &self.serializer
    }

    /// Execute one turn for a user message.
    ///
    /// # Arguments
    /// * `conversation_id` - Conversation identifier
    /// * `system_prompt` - System prompt (agent soul)
    /// * `user_text` - User's input message
    ///
    /// # Returns
    /// Final assistant text, or [`MAX_ITERATIONS_SENTINEL`]
    ///
    /// # Errors
    /// Model failures and store write failures end the turn. Everything
    /// persisted before the failure stays persisted.
    pub async fn run(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, RuntimeError> {
        let _turn_timer = crate::metrics::MetricTimer::new("turn_duration");

        info!("Acquiring lock for conversation: {}", conversation_id);
        let guard = self.acquire(conversation_id).await?;
        crate::metrics::record_lock_wait(guard.wait_time());

        let _permit = match &self.concurrency_limiter {
            Some(limiter) => Some(limiter.acquire().await.map_err(|e| {
                RuntimeError::LockError(format!("Concurrency limit error: {}", e))
            })?),
            None => None,
        };

        let result = self.run_locked(conversation_id, system_prompt, user_text).await;

        info!("Releasing lock for conversation: {}", conversation_id);
        drop(guard);

        result
    }

    async fn acquire(&self, conversation_id: &str) -> Result<TurnGuard, RuntimeError> {
        match self.lock_timeout {
            Some(deadline) => self
                .serializer
                .acquire_within(conversation_id, deadline)
                .await
                .map_err(|e| {
                    warn!("Conversation {} busy: {}", conversation_id, e);
                    RuntimeError::LockError(e.to_string())
                }),
            None => Ok(self.serializer.acquire(conversation_id).await),
        }
    }

    async fn run_locked(
        &self,
        conversation_id: &str,
        system_prompt: &str,
        user_text: &str,
    ) -> Result<String, RuntimeError> {
        debug!(phase = ?TurnPhase::Loading, "Loading conversation: {}", conversation_id);
        let loaded = self.store.load(conversation_id).await?;
        let loaded_len = loaded.len();

        debug!(phase = ?TurnPhase::Sanitizing);
        let messages = history::sanitize(loaded);
        if messages.len() != loaded_len {
            warn!(
                "Dropped {} unanswered trailing message(s) from {}",
                loaded_len - messages.len(),
                conversation_id
            );
            self.store.replace(conversation_id, &messages).await?;
        }

        debug!(phase = ?TurnPhase::Compacting);
        let mut messages = match self.compactor.compact(messages).await {
            Compaction::Compacted {
                messages,
                summarized,
            } => {
                info!(
                    "Compacted {} messages of {} into a summary",
                    summarized, conversation_id
                );
                self.store.replace(conversation_id, &messages).await?;
                messages
            }
            Compaction::Unchanged(messages) => messages,
        };

        debug!(phase = ?TurnPhase::Appending);
        let user_message = Message::user(user_text);
        self.store.append_one(conversation_id, &user_message).await?;
        messages.push(user_message);

        let tool_schemas = self.dispatcher.schemas();

        for iteration in 1..=self.max_iterations {
            debug!(
                phase = ?TurnPhase::Iterating(iteration),
                "LLM loop iteration {}/{}",
                iteration,
                self.max_iterations
            );

            let response = self
                .model
                .complete(system_prompt, &messages, &tool_schemas)
                .await
                .map_err(|e| {
                    error!("LLM call failed: {}", e);
                    e
                })?;

            let (content, calls) = match response {
                ModelResponse::Text(text) => (Some(text), Vec::new()),
                ModelResponse::ToolCalls { content, calls } => (content, calls),
            };

            if calls.is_empty() {
                let text = content.unwrap_or_default();
                self.store
                    .append_one(conversation_id, &Message::assistant(text.clone()))
                    .await?;
                info!(
                    phase = ?TurnPhase::Done,
                    "Turn finished after {} iteration(s)",
                    iteration
                );
                return Ok(text);
            }

            info!("LLM requested {} tool call(s)", calls.len());
            let mut batch = Vec::with_capacity(calls.len() + 1);
            batch.push(Message::assistant_tool_calls(content, calls.clone()));

            for call in &calls {
                let started = Instant::now();
                let result = self
                    .dispatcher
                    .execute(conversation_id, &call.name, &call.arguments)
                    .await;
                debug!("Tool {} returned in {:?}", call.name, started.elapsed());

                if let Some(observer) = &self.observer {
                    observer.on_tool_use(&call.name, &call.arguments, &result);
                }
                batch.push(Message::tool_result(call.id.clone(), result));
            }

            self.store.append_many(conversation_id, &batch).await?;
            messages.extend(batch);
        }

        warn!(
            phase = ?TurnPhase::MaxIterationsReached,
            "Max iterations ({}) reached for {}",
            self.max_iterations,
            conversation_id
        );
        crate::metrics::increment_max_iterations_count();
        Ok(MAX_ITERATIONS_SENTINEL.to_string())
    }
}
