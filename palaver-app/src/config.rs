use anyhow::{Context, Result};
use palaver_infra::infra::DEFAULT_SAFE_COMMANDS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "palaver.toml";

/// Application settings. Every field has a default, so an empty or
/// missing file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub workspace_dir: PathBuf,
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub max_iterations: usize,
    pub compaction_threshold: usize,
    pub tool_timeout_ms: u64,
    pub lock_timeout_secs: u64,
    pub safe_commands: Vec<String>,
    /// Defaults to `<workspace_dir>/agents` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agents_dir: Option<PathBuf>,
    pub max_concurrent_turns: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("./workspace"),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            max_iterations: 20,
            compaction_threshold: 100_000,
            tool_timeout_ms: 60_000,
            lock_timeout_secs: 300,
            safe_commands: DEFAULT_SAFE_COMMANDS.iter().map(|s| s.to_string()).collect(),
            agents_dir: None,
            max_concurrent_turns: 100,
        }
    }
}

impl Config {
    /// Read `path` if it exists, then apply `PALAVER_*` environment
    /// overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Self::from_toml(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("PALAVER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = get("PALAVER_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = get("PALAVER_MODEL") {
            self.model = model;
        }
        if let Some(dir) = get("PALAVER_WORKSPACE") {
            self.workspace_dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            anyhow::bail!("base_url cannot be empty");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model cannot be empty");
        }
        if self.max_iterations == 0 {
            anyhow::bail!("max_iterations must be at least 1");
        }
        Ok(())
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.workspace_dir.join("sessions")
    }

    pub fn approvals_path(&self) -> PathBuf {
        self.workspace_dir.join("exec-approvals.json")
    }

    pub fn soul_path(&self) -> PathBuf {
        self.workspace_dir.join("SOUL.md")
    }

    pub fn agents_dir(&self) -> PathBuf {
        self.agents_dir
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join("agents"))
    }
}
