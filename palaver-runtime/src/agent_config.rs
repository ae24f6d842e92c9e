//! Agent profile loading.

use crate::interfaces::RuntimeError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Persona used when a profile names no soul file or the file is missing.
pub const DEFAULT_SOUL: &str = "\
# Who You Are

**Name:** Assistant
**Role:** Personal assistant running on the user's machine

## Personality
- Be genuinely helpful; skip filler and get to the point
- Have opinions and say so when you disagree
- Be concise by default, thorough when it matters

## Boundaries
- Private things stay private
- Ask before doing anything destructive or outward-facing
- Use the available tools instead of guessing about files or commands";

pub const DEFAULT_SESSION_PREFIX: &str = "agent:main";

/// One agent persona: its name, routing prefix and conversation namespace.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub prefix: Option<String>,
    pub session_prefix: String,
    pub soul: String,
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    name: String,
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default = "default_session_prefix")]
    session_prefix: String,
    #[serde(default)]
    soul: Option<String>,
}

fn default_session_prefix() -> String {
    DEFAULT_SESSION_PREFIX.to_string()
}

impl AgentProfile {
    pub fn new(
        name: impl Into<String>,
        session_prefix: impl Into<String>,
        soul: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            session_prefix: session_prefix.into(),
            soul: soul.into(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Soul plus a short context section.
    pub fn system_prompt(&self, workspace: Option<&Path>) -> String {
        let mut prompt = self.soul.clone();
        prompt.push_str("\n\n## Context\n");
        prompt.push_str(&format!("- Agent: {}", self.name));
        if let Some(workspace) = workspace {
            prompt.push_str(&format!("\n- Workspace: {}", workspace.display()));
        }
        prompt
    }
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self::new("Assistant", DEFAULT_SESSION_PREFIX, DEFAULT_SOUL)
    }
}

/// Read a soul file, falling back to [`DEFAULT_SOUL`] when it is absent or blank.
pub fn load_soul(path: Option<&Path>) -> String {
    let Some(path) = path else {
        return DEFAULT_SOUL.to_string();
    };

    match std::fs::read_to_string(path) {
        Ok(content) if !content.trim().is_empty() => content.trim().to_string(),
        Ok(_) => {
            warn!("Soul file {} is empty, using default persona", path.display());
            DEFAULT_SOUL.to_string()
        }
        Err(e) => {
            warn!("Cannot read soul file {}: {}, using default persona", path.display(), e);
            DEFAULT_SOUL.to_string()
        }
    }
}

/// Load an agent profile from a YAML file.
///
/// `soul` is resolved relative to the YAML file's directory.
///
/// # Errors
/// Returns `ConfigError` if the file is missing, empty or malformed.
pub fn load_agent_profile(config_path: &Path) -> Result<AgentProfile, RuntimeError> {
    if !config_path.exists() {
        return Err(RuntimeError::ConfigError(format!(
            "Config file not found: {}",
            config_path.display()
        )));
    }

    let content = std::fs::read_to_string(config_path)?;
    if content.trim().is_empty() {
        return Err(RuntimeError::ConfigError(format!(
            "Config file is empty: {}",
            config_path.display()
        )));
    }

    let raw: RawProfile = serde_yaml::from_str(&content).map_err(|e| {
        RuntimeError::ConfigError(format!("Invalid YAML in {}: {}", config_path.display(), e))
    })?;

    if raw.name.trim().is_empty() {
        return Err(RuntimeError::ConfigError(
            "Config missing required field: name".to_string(),
        ));
    }
    if raw.session_prefix.trim().is_empty() {
        return Err(RuntimeError::ConfigError(
            "session_prefix must not be empty".to_string(),
        ));
    }

    let soul_path = raw.soul.as_deref().map(|soul| resolve_relative(config_path, soul));
    let prefix = raw
        .prefix
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    Ok(AgentProfile {
        name: raw.name,
        prefix,
        session_prefix: raw.session_prefix,
        soul: load_soul(soul_path.as_deref()),
    })
}

/// Load every `*.yaml` / `*.yml` profile in `dir`, sorted by file name.
/// A missing directory yields no profiles.
pub fn load_agent_profiles(dir: &Path) -> Result<Vec<AgentProfile>, RuntimeError> {
    if !dir.is_dir() {
        debug!("No agents directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            )
        })
        .collect();
    paths.sort();

    paths.iter().map(|p| load_agent_profile(p)).collect()
}

fn resolve_relative(config_path: &Path, target: &str) -> PathBuf {
    let target = Path::new(target);
    if target.is_absolute() {
        target.to_path_buf()
    } else {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(target)
    }
}
