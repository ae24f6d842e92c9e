//! History compaction for managing context window size.

use crate::interfaces::{RuntimeError, Summarizer};
use crate::types::{Message, Role};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tool results longer than this are cut when rendered for the summarizer.
const TOOL_RESULT_PREVIEW_CHARS: usize = 500;

const COMPACTION_PROMPT: &str = "Summarize the following conversation concisely. \
Preserve all important facts, decisions, user preferences, file paths, \
variable names, and action outcomes. Be specific, do not generalize. \
Format as a bullet list.\n\nConversation to summarize:\n";

/// Coarse, monotonic cost proxy for a message list.
pub trait SizeEstimator: Send + Sync {
    fn estimate(&self, messages: &[Message]) -> usize;
}

/// Serialized JSON length divided by a fixed ratio (4 by default).
#[derive(Debug, Clone)]
pub struct CharRatioEstimator {
    chars_per_unit: usize,
}

impl CharRatioEstimator {
    pub fn new(chars_per_unit: usize) -> Self {
        Self {
            chars_per_unit: chars_per_unit.max(1),
        }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl SizeEstimator for CharRatioEstimator {
    fn estimate(&self, messages: &[Message]) -> usize {
        let chars = serde_json::to_string(messages)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        chars / self.chars_per_unit
    }
}

/// Outcome of a compaction attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Compaction {
    Unchanged(Vec<Message>),
    Compacted {
        messages: Vec<Message>,
        summarized: usize,
    },
}

impl Compaction {
    pub fn messages(&self) -> &[Message] {
        match self {
            Compaction::Unchanged(messages) => messages,
            Compaction::Compacted { messages, .. } => messages,
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Compaction::Unchanged(messages) => messages,
            Compaction::Compacted { messages, .. } => messages,
        }
    }
}

/// Replaces the older half of a long history with a model-written summary.
pub struct Compactor<S: Summarizer> {
    threshold: usize,
    summarizer: Arc<S>,
    estimator: Box<dyn SizeEstimator>,
    summary_timeout: Option<Duration>,
}

impl<S: Summarizer> Compactor<S> {
    /// Create a compactor using the default size estimator.
    ///
    /// # Arguments
    /// * `threshold` - Estimated size above which the history is compacted
    /// * `summarizer` - Summarizer implementation
    pub fn new(threshold: usize, summarizer: Arc<S>) -> Self {
        Self {
            threshold,
            summarizer,
            estimator: Box::new(CharRatioEstimator::default()),
            summary_timeout: None,
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn SizeEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// Give up on compaction if the summarizer takes longer than `timeout`.
    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = Some(timeout);
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn estimate(&self, messages: &[Message]) -> usize {
        self.estimator.estimate(messages)
    }

    /// Compact `messages` if they exceed the threshold.
    ///
    /// Any summarizer failure leaves the history untouched.
    pub async fn compact(&self, messages: Vec<Message>) -> Compaction {
        if messages.len() < 2 {
            return Compaction::Unchanged(messages);
        }

        let size = self.estimate(&messages);
        if size <= self.threshold {
            debug!(
                "Estimated size {} within threshold {}, no compaction needed",
                size, self.threshold
            );
            return Compaction::Unchanged(messages);
        }

        info!(
            "Estimated size {} exceeds threshold {}, compacting",
            size, self.threshold
        );

        let split = split_point(&messages);
        let prompt = format!("{}{}", COMPACTION_PROMPT, render_transcript(&messages[..split]));

        let summary = match self.request_summary(&prompt).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Compaction aborted, keeping full history: {}", e);
                return Compaction::Unchanged(messages);
            }
        };

        crate::metrics::increment_compaction_count();

        let summary = if summary.trim().is_empty() {
            "(empty summary)".to_string()
        } else {
            summary
        };

        let mut compacted = Vec::with_capacity(messages.len() - split + 1);
        compacted.push(Message::user(format!(
            "[Conversation summary of {} earlier messages]\n\n{}",
            split, summary
        )));
        compacted.extend_from_slice(&messages[split..]);

        info!(
            "Compacted {} messages to {} messages",
            messages.len(),
            compacted.len()
        );

        Compaction::Compacted {
            messages: compacted,
            summarized: split,
        }
    }

    async fn request_summary(&self, prompt: &str) -> Result<String, RuntimeError> {
        match self.summary_timeout {
            Some(limit) => tokio::time::timeout(limit, self.summarizer.summarize(prompt))
                .await
                .map_err(|_| {
                    RuntimeError::SummaryError(format!("summarizer timed out after {:?}", limit))
                })?,
            None => self.summarizer.summarize(prompt).await,
        }
    }
}

/// Index to split at: the first user message at or after the midpoint, else
/// the last one before it, else the midpoint itself.
///
/// Requires `messages.len() >= 2`, so the result is always in `1..len`.
pub fn split_point(messages: &[Message]) -> usize {
    let mid = messages.len() / 2;

    if let Some(offset) = messages[mid..].iter().position(|m| m.role == Role::User) {
        return mid + offset;
    }

    (1..mid)
        .rev()
        .find(|&i| messages[i].role == Role::User)
        .unwrap_or(mid)
}

/// Flatten messages into the plain-text transcript handed to the summarizer.
pub fn render_transcript(messages: &[Message]) -> String {
    let mut lines = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::Tool => {
                let preview: String = msg.text().chars().take(TOOL_RESULT_PREVIEW_CHARS).collect();
                lines.push(format!(
                    "[Tool result {}]: {}",
                    msg.tool_call_id.as_deref().unwrap_or(""),
                    preview
                ));
            }
            Role::Assistant if msg.has_tool_calls() => {
                let names: Vec<&str> = msg.tool_calls.iter().map(|c| c.name.as_str()).collect();
                lines.push(format!("Assistant: [called tools: {}]", names.join(", ")));
                if !msg.text().is_empty() {
                    lines.push(format!("Assistant: {}", msg.text()));
                }
            }
            Role::System => lines.push(format!("System: {}", msg.text())),
            Role::User => lines.push(format!("User: {}", msg.text())),
            Role::Assistant => lines.push(format!("Assistant: {}", msg.text())),
        }
    }

    lines.join("\n")
}
