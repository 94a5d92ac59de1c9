use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator / category router configuration (§4.6, §4.7, §10.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub free_chat: bool,
    #[serde(default)]
    pub default_agent: Option<String>,
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,
    #[serde(default = "default_global_cooldown_ms")]
    pub global_cooldown_ms: u64,
    #[serde(default = "default_agent_cooldown_ms")]
    pub default_agent_cooldown_ms: u64,
    #[serde(default)]
    pub categories: Vec<CategoryDef>,
    /// Per-channel overrides resolved by the orchestrator at selection
    /// time — never baked into the static defaults above (§10.3).
    #[serde(default)]
    pub channel_overrides: HashMap<String, ChannelOverride>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            free_chat: false,
            default_agent: None,
            max_chain_length: default_max_chain_length(),
            global_cooldown_ms: default_global_cooldown_ms(),
            default_agent_cooldown_ms: default_agent_cooldown_ms(),
            categories: Vec::new(),
            channel_overrides: HashMap::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn free_chat_for(&self, channel: &str) -> bool {
        self.channel_overrides
            .get(channel)
            .and_then(|o| o.free_chat)
            .unwrap_or(self.free_chat)
    }

    pub fn default_agent_for(&self, channel: &str) -> Option<String> {
        self.channel_overrides
            .get(channel)
            .and_then(|o| o.default_agent.clone())
            .or_else(|| self.default_agent.clone())
    }

    pub fn is_disabled_in(&self, channel: &str, agent_id: &str) -> bool {
        self.channel_overrides
            .get(channel)
            .map(|o| o.disabled_agents.iter().any(|a| a == agent_id))
            .unwrap_or(false)
    }
}

/// A per-channel override of the orchestrator's global defaults (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelOverride {
    #[serde(default)]
    pub free_chat: Option<bool>,
    #[serde(default)]
    pub default_agent: Option<String>,
    #[serde(default)]
    pub disabled_agents: Vec<String>,
    #[serde(default)]
    pub agent_cooldown_ms: Option<u64>,
}

/// One routing category (§4.7): ordered regex patterns mapped to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    pub patterns: Vec<String>,
    pub agent_ids: Vec<String>,
    #[serde(default)]
    pub priority: i64,
}

fn default_enabled() -> bool {
    true
}
fn default_max_chain_length() -> usize {
    5
}
fn default_global_cooldown_ms() -> u64 {
    0
}
fn default_agent_cooldown_ms() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_override_falls_back_to_global() {
        let mut cfg = OrchestratorConfig {
            free_chat: true,
            default_agent: Some("global".into()),
            ..Default::default()
        };
        assert!(cfg.free_chat_for("anywhere"));
        assert_eq!(cfg.default_agent_for("anywhere"), Some("global".into()));

        cfg.channel_overrides.insert(
            "c1".into(),
            ChannelOverride {
                free_chat: Some(false),
                default_agent: Some("local".into()),
                disabled_agents: vec!["x".into()],
                agent_cooldown_ms: None,
            },
        );
        assert!(!cfg.free_chat_for("c1"));
        assert_eq!(cfg.default_agent_for("c1"), Some("local".into()));
        assert!(cfg.is_disabled_in("c1", "x"));
        assert!(!cfg.is_disabled_in("c1", "y"));
        assert!(!cfg.is_disabled_in("other", "x"));
    }

    #[test]
    fn defaults_have_free_chat_off() {
        assert!(!OrchestratorConfig::default().free_chat);
        assert_eq!(OrchestratorConfig::default().max_chain_length, 5);
    }

    #[test]
    fn defaults_to_enabled() {
        assert!(OrchestratorConfig::default().enabled);
    }
}
