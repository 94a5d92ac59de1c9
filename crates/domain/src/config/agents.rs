use crate::model::Agent;
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent registry configuration (§3, §4.3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The configured agent population plus the pool-size fallback used when
/// an agent doesn't set its own `pool_size` (§4.3: `agentPoolSizes[agent]
/// ?? defaultPoolSize`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default = "default_pool_size")]
    pub default_pool_size: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            default_pool_size: default_pool_size(),
        }
    }
}

impl AgentsConfig {
    pub fn find(&self, agent_id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.agent_id == agent_id)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &Agent> {
        self.agents.iter().filter(|a| a.enabled)
    }

    pub fn pool_size_for(&self, agent_id: &str) -> usize {
        self.find(agent_id)
            .and_then(|a| a.pool_size)
            .unwrap_or(self.default_pool_size)
            .max(1)
    }
}

fn default_pool_size() -> usize {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;

    fn agent(id: &str, pool_size: Option<usize>) -> Agent {
        Agent {
            agent_id: id.into(),
            display_name: id.into(),
            trigger_prefix: None,
            tier: Some(Tier::One),
            can_delegate: None,
            is_planning_agent: None,
            auto_continue: None,
            tool_permissions: None,
            auto_respond_keywords: vec![],
            pool_size,
            enabled: true,
            model: None,
            command: None,
            working_dir: None,
        }
    }

    #[test]
    fn pool_size_falls_back_to_default() {
        let cfg = AgentsConfig {
            agents: vec![agent("a", None)],
            default_pool_size: 3,
        };
        assert_eq!(cfg.pool_size_for("a"), 3);
    }

    #[test]
    fn pool_size_uses_agent_override() {
        let cfg = AgentsConfig {
            agents: vec![agent("a", Some(7))],
            default_pool_size: 3,
        };
        assert_eq!(cfg.pool_size_for("a"), 7);
    }

    #[test]
    fn unknown_agent_uses_default() {
        let cfg = AgentsConfig {
            agents: vec![],
            default_pool_size: 2,
        };
        assert_eq!(cfg.pool_size_for("ghost"), 2);
    }

    #[test]
    fn default_pool_size_is_one() {
        assert_eq!(AgentsConfig::default().default_pool_size, 1);
    }
}
