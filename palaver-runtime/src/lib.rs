//! Palaver runtime core
//!
//! The agent turn engine and the capabilities it is wired from: message
//! model, conversation store, tool dispatch, model client, compaction and
//! routing.

pub mod types;
pub mod interfaces;
pub mod history;
pub mod gateway;
pub mod agent_config;
pub mod router;
pub mod llm_client;
pub mod compactor;
pub mod agent_loop;
pub mod runtime_controller;
pub mod async_adapters;
pub mod metrics;

pub use types::{Message, ModelResponse, Role, ToolCall, SCHEMA_VERSION};
pub use interfaces::{
    ConversationStore, Dispatch, ModelClient, RuntimeError, Summarizer, ToolDispatcher,
    ToolObserver,
};
pub use gateway::conversation_id;
pub use agent_config::{
    load_agent_profile, load_agent_profiles, load_soul, AgentProfile, DEFAULT_SESSION_PREFIX,
    DEFAULT_SOUL,
};
pub use router::AgentRouter;
pub use llm_client::{ChatSummarizer, OpenAiCompatibleClient};
pub use compactor::{CharRatioEstimator, Compaction, Compactor, SizeEstimator};
pub use agent_loop::{AgentLoop, TurnPhase, DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_SENTINEL};
pub use runtime_controller::{RuntimeController, DEFAULT_MAX_CONCURRENT_TURNS};
pub use async_adapters::AsyncConversationLog;
