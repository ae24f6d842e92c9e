//! Wires the workspace, tools and runtime from a [`Config`].

use crate::config::Config;
use anyhow::{Context, Result};
use palaver_infra::infra::{Approver, ConversationLog, PermissionGate, TurnSerializer};
use palaver_runtime::{
    load_agent_profiles, load_soul, AgentLoop, AgentProfile, AgentRouter, AsyncConversationLog,
    ChatSummarizer, Compactor, OpenAiCompatibleClient, RuntimeController, ToolObserver,
    DEFAULT_SESSION_PREFIX,
};
use palaver_tools::tools::{ListDirectoryTool, ReadFileTool, RunCommandTool, WriteFileTool};
use palaver_tools::{ToolDispatcherImpl, ToolRegistryImpl};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type Controller = RuntimeController<
    AsyncConversationLog,
    ToolDispatcherImpl,
    OpenAiCompatibleClient,
    ChatSummarizer,
>;

/// Everything a front-end needs.
pub struct App {
    pub config: Config,
    pub controller: Controller,
    pub log: Arc<ConversationLog>,
    pub tool_names: Vec<String>,
}

/// Create the workspace directories if missing.
pub fn prepare_workspace(config: &Config) -> Result<()> {
    for dir in [config.workspace_dir.clone(), config.sessions_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    Ok(())
}

pub fn open_log(config: &Config) -> Result<Arc<ConversationLog>> {
    let log = ConversationLog::new(config.sessions_dir())
        .with_context(|| format!("Failed to open {}", config.sessions_dir().display()))?;
    Ok(Arc::new(log))
}

/// Default agent from `SOUL.md` plus every profile under the agents dir.
pub fn build_router(config: &Config) -> Result<AgentRouter> {
    let soul_path = config.soul_path();
    let default = AgentProfile::new(
        "Assistant",
        DEFAULT_SESSION_PREFIX,
        load_soul(Some(soul_path.as_path())),
    );

    let agents =
        load_agent_profiles(&config.agents_dir()).context("Failed to load agent profiles")?;
    for agent in &agents {
        info!(
            "Loaded agent {} (prefix {:?}, sessions {})",
            agent.name, agent.prefix, agent.session_prefix
        );
    }

    AgentRouter::new(default, agents).context("Invalid agent configuration")
}

pub fn build_registry(config: &Config, approver: Box<dyn Approver>) -> Result<ToolRegistryImpl> {
    let gate = PermissionGate::with_safe_commands(
        config.approvals_path(),
        config.safe_commands.iter().cloned(),
        approver,
    )
    .context("Failed to load exec approvals")?;

    let mut registry = ToolRegistryImpl::new();
    registry
        .register(Arc::new(RunCommandTool::new(Arc::new(gate))))?
        .register(Arc::new(ReadFileTool))?
        .register(Arc::new(WriteFileTool))?
        .register(Arc::new(ListDirectoryTool))?;
    Ok(registry)
}

pub fn build_app(
    config: Config,
    approver: Box<dyn Approver>,
    observer: Option<Arc<dyn ToolObserver>>,
) -> Result<App> {
    prepare_workspace(&config)?;
    let log = open_log(&config)?;

    let registry = build_registry(&config, approver)?;
    let tool_names = registry.list();
    let dispatcher = Arc::new(ToolDispatcherImpl::new(
        Arc::new(registry),
        config.tool_timeout_ms,
    ));

    let mut client = OpenAiCompatibleClient::new(config.base_url.clone(), config.model.clone());
    if let Some(key) = &config.api_key {
        client = client.with_api_key(key.clone());
    }
    let client = Arc::new(client);
    let summarizer = Arc::new(ChatSummarizer::new(client.clone()));

    let mut agent_loop = AgentLoop::new(
        Arc::new(AsyncConversationLog::new(log.clone())),
        Arc::new(TurnSerializer::new()),
        dispatcher,
        client,
        Compactor::new(config.compaction_threshold, summarizer),
        config.max_iterations,
    )
    .with_lock_timeout(Duration::from_secs(config.lock_timeout_secs));
    if let Some(observer) = observer {
        agent_loop = agent_loop.with_observer(observer);
    }

    let router = build_router(&config)?;
    let controller = RuntimeController::with_max_concurrent_turns(
        agent_loop,
        router,
        config.max_concurrent_turns,
    )
    .with_workspace(config.workspace_dir.clone());

    info!(
        "Runtime ready: model={}, tools={}, workspace={}",
        config.model,
        tool_names.join(","),
        config.workspace_dir.display()
    );

    Ok(App {
        config,
        controller,
        log,
        tool_names,
    })
}
