//! Prefix-based routing between agent profiles.

use crate::agent_config::AgentProfile;
use crate::interfaces::RuntimeError;
use std::sync::Arc;

const EMPTY_QUERY: &str = "(no query provided)";

/// Picks an agent for each message by its leading command prefix.
pub struct AgentRouter {
    default: Arc<AgentProfile>,
    // Sorted longest prefix first; keys are lowercase.
    prefixed: Vec<(String, Arc<AgentProfile>)>,
}

impl AgentRouter {
    /// Build a router. Profiles without a prefix are only reachable by
    /// conversation id; two profiles claiming the same prefix is an error.
    pub fn new(default: AgentProfile, agents: Vec<AgentProfile>) -> Result<Self, RuntimeError> {
        let mut prefixed: Vec<(String, Arc<AgentProfile>)> = Vec::new();

        for agent in agents {
            let Some(prefix) = agent.prefix.as_deref().map(str::to_lowercase) else {
                continue;
            };
            if prefixed.iter().any(|(p, _)| *p == prefix) {
                return Err(RuntimeError::ConfigError(format!(
                    "Prefix {} is claimed by more than one agent",
                    prefix
                )));
            }
            prefixed.push((prefix, Arc::new(agent)));
        }

        prefixed.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            default: Arc::new(default),
            prefixed,
        })
    }

    /// Resolve the agent for `text` and the text with its prefix removed.
    ///
    /// A prefix matches case-insensitively and only when followed by
    /// whitespace or the end of the message.
    pub fn resolve(&self, text: &str) -> (Arc<AgentProfile>, String) {
        let trimmed = text.trim();
        let lower = trimmed.to_lowercase();

        for (prefix, agent) in &self.prefixed {
            if !lower.starts_with(prefix.as_str()) {
                continue;
            }
            // Lowercasing can change byte lengths outside ASCII.
            let Some(rest) = trimmed.get(prefix.len()..) else {
                continue;
            };
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                continue;
            }

            let query = rest.trim();
            let query = if query.is_empty() { EMPTY_QUERY } else { query };
            return (agent.clone(), query.to_string());
        }

        (self.default.clone(), text.to_string())
    }

    /// Profile owning `conversation_id`, judged by its session prefix.
    pub fn profile_for_conversation(&self, conversation_id: &str) -> Arc<AgentProfile> {
        self.prefixed
            .iter()
            .map(|(_, agent)| agent)
            .filter(|agent| {
                conversation_id
                    .strip_prefix(agent.session_prefix.as_str())
                    .is_some_and(|rest| rest.starts_with(':'))
            })
            .max_by_key(|agent| agent.session_prefix.len())
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    pub fn default_agent(&self) -> &AgentProfile {
        &self.default
    }

    /// Every agent name, default first.
    pub fn agent_names(&self) -> Vec<String> {
        std::iter::once(self.default.name.clone())
            .chain(self.prefixed.iter().map(|(_, a)| a.name.clone()))
            .collect()
    }

    /// Registered prefixes, longest first.
    pub fn prefixes(&self) -> Vec<String> {
        self.prefixed.iter().map(|(p, _)| p.clone()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn router() -> AgentRouter {
        AgentRouter::new(
            AgentProfile::new("Jarvis", "agent:main", "main soul"),
            vec![
                AgentProfile::new("Scout", "agent:research", "scout soul").with_prefix("/research"),
                AgentProfile::new("Deep", "agent:deep", "deep soul").with_prefix("/research-deep"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_unprefixed_goes_to_default() {
        let (agent, text) = router().resolve("hello there");
        assert_eq!(agent.name, "Jarvis");
        assert_eq!(text, "hello there");
    }

    #[test]
    fn test_prefix_stripped_case_insensitive() {
        let (agent, text) = router().resolve("  /RESEARCH  quantum computing ");
        assert_eq!(agent.name, "Scout");
        assert_eq!(text, "quantum computing");
    }

    #[test]
    fn test_longest_prefix_wins() {
        let (agent, text) = router().resolve("/research-deep rust async");
        assert_eq!(agent.name, "Deep");
        assert_eq!(text, "rust async");
    }

    #[test]
    fn test_prefix_needs_word_boundary() {
        let (agent, text) = router().resolve("/researcher notes");
        assert_eq!(agent.name, "Jarvis");
        assert_eq!(text, "/researcher notes");
    }

    #[test]
    fn test_bare_prefix_gets_placeholder() {
        let (agent, text) = router().resolve("/research");
        assert_eq!(agent.name, "Scout");
        assert_eq!(text, "(no query provided)");
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let result = AgentRouter::new(
            AgentProfile::default(),
            vec![
                AgentProfile::new("A", "agent:a", "").with_prefix("/x"),
                AgentProfile::new("B", "agent:b", "").with_prefix("/X"),
            ],
        );
        assert!(matches!(result, Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn test_profile_for_conversation() {
        let router = router();
        assert_eq!(router.profile_for_conversation("agent:research:repl:u1").name, "Scout");
        assert_eq!(router.profile_for_conversation("agent:deep:repl:u1").name, "Deep");
        assert_eq!(router.profile_for_conversation("agent:researcher:x:y").name, "Jarvis");
        assert_eq!(router.profile_for_conversation("other").name, "Jarvis");
    }

    #[test]
    fn test_agent_names_and_prefixes() {
        let router = router();
        assert_eq!(router.agent_names(), vec!["Jarvis", "Deep", "Scout"]);
        assert_eq!(router.prefixes(), vec!["/research-deep", "/research"]);
    }
}
