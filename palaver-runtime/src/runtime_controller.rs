//! Runtime controller - main entry point for front-ends.

use crate::agent_config::AgentProfile;
use crate::agent_loop::AgentLoop;
use crate::gateway::conversation_id;
use crate::interfaces::{
    ConversationStore, Dispatch, ModelClient, RuntimeError, Summarizer, ToolDispatcher,
};
use crate::router::AgentRouter;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

pub const DEFAULT_MAX_CONCURRENT_TURNS: usize = 100;

/// Routes messages to agents and runs their turns under a global cap on
/// executing turns. Turns waiting for a busy conversation do not count.
pub struct RuntimeController<S, D, M, Sum>
where
    S: ConversationStore,
    D: ToolDispatcher,
    M: ModelClient,
    Sum: Summarizer,
{
    agent_loop: AgentLoop<S, D, M, Sum>,
    router: AgentRouter,
    workspace: Option<PathBuf>,
    concurrency_limiter: Arc<Semaphore>,
}

impl<S, D, M, Sum> RuntimeController<S, D, M, Sum>
where
    S: ConversationStore,
    D: ToolDispatcher,
    M: ModelClient,
    Sum: Summarizer,
{
    pub fn new(agent_loop: AgentLoop<S, D, M, Sum>, router: AgentRouter) -> Self {
        Self::with_max_concurrent_turns(agent_loop, router, DEFAULT_MAX_CONCURRENT_TURNS)
    }

    /// # Arguments
    /// * `agent_loop` - Configured agent loop instance
    /// * `router` - Agent profiles and their prefixes
    /// * `max_concurrent_turns` - Turns allowed to run at once across all conversations
    pub fn with_max_concurrent_turns(
        agent_loop: AgentLoop<S, D, M, Sum>,
        router: AgentRouter,
        max_concurrent_turns: usize,
    ) -> Self {
        let concurrency_limiter = Arc::new(Semaphore::new(max_concurrent_turns.max(1)));
        Self {
            agent_loop: agent_loop.with_concurrency_limiter(Arc::clone(&concurrency_limiter)),
            router,
            workspace: None,
            concurrency_limiter,
        }
    }

    /// Mention this directory in every system prompt.
    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = Some(workspace);
        self
    }

    pub fn router(&self) -> &AgentRouter {
        &self.router
    }

    pub fn available_permits(&self) -> usize {
        self.concurrency_limiter.available_permits()
    }

    /// Route a raw message from `user_id` on `channel` and run the turn.
    ///
    /// A leading agent prefix selects the agent and its conversation; the
    /// prefix itself is not sent to the model.
    pub async fn handle(
        &self,
        channel: &str,
        user_id: &str,
        text: &str,
    ) -> Result<String, RuntimeError> {
        let (agent, cleaned) = self.router.resolve(text);
        let conversation = conversation_id(&agent.session_prefix, channel, user_id)?;
        info!(
            "Processing request: channel={}, user={}, agent={}",
            channel, user_id, agent.name
        );
        self.run_turn(&agent, &conversation, &cleaned).await
    }

    async fn run_turn(
        &self,
        agent: &AgentProfile,
        conversation_id: &str,
        text: &str,
    ) -> Result<String, RuntimeError> {
        let system_prompt = agent.system_prompt(self.workspace.as_deref());

        let response = self
            .agent_loop
            .run(conversation_id, &system_prompt, text)
            .await
            .map_err(|e| {
                error!("Turn failed for {}: {}", conversation_id, e);
                e
            })?;

        info!("Request completed for conversation: {}", conversation_id);
        Ok(response)
    }
}

#[async_trait]
impl<S, D, M, Sum> Dispatch for RuntimeController<S, D, M, Sum>
where
    S: ConversationStore,
    D: ToolDispatcher,
    M: ModelClient,
    Sum: Summarizer,
{
    /// Run a turn on an already-composed conversation id. The agent is the
    /// one whose session prefix owns the id; no prefix routing on `text`.
    async fn dispatch(&self, conversation_id: &str, text: &str) -> Result<String, RuntimeError> {
        let agent = self.router.profile_for_conversation(conversation_id);
        self.run_turn(&agent, conversation_id, text).await
    }
}
