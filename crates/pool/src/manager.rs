//! Agent Process Manager (§4.4): wraps one `AgentProcessPool` and owns
//! the tier-based environment the subprocess is spawned with.

use std::collections::HashMap;

use crate::pool::{AgentProcessPool, Acquired};
use crate::process::{AgentProcess, SpawnSpec};
use orc_domain::{Agent, Tier};

pub struct AgentProcessManager {
    pool: AgentProcessPool,
    tier1_hook_features: String,
}

impl AgentProcessManager {
    pub fn new(pool: AgentProcessPool, tier1_hook_features: impl Into<String>) -> Self {
        Self {
            pool,
            tier1_hook_features: tier1_hook_features.into(),
        }
    }

    /// Tier-1 gets `MAMA_HOOK_FEATURES` and must not see
    /// `MAMA_DISABLE_HOOKS`; tier 2/3 get the inverse. Missing tier
    /// defaults to tier 1 for this purpose (§4.4 — distinct from the
    /// tool-permission fail-safe-to-tier-2 rule in §4.5).
    pub fn tier_env(&self, tier: Tier) -> HashMap<String, String> {
        let mut env = HashMap::new();
        if let Ok(path) = std::env::var("PATH") {
            env.insert("PATH".to_string(), path);
        }
        match tier {
            Tier::One => {
                env.insert("MAMA_HOOK_FEATURES".to_string(), self.tier1_hook_features.clone());
            }
            Tier::Two | Tier::Three => {
                env.insert("MAMA_DISABLE_HOOKS".to_string(), "true".to_string());
            }
        }
        env
    }

    fn spawn_spec(&self, agent: &Agent) -> SpawnSpec {
        SpawnSpec {
            command: agent.command.clone().unwrap_or_else(|| "agent-cli".to_string()),
            model: agent.model.clone(),
            working_dir: agent.working_dir.clone(),
            env: self.tier_env(agent.tier.unwrap_or(Tier::One)),
        }
    }

    /// `getProcess(source, channel, agent)`. `source`/`channel` are not
    /// used for pool partitioning (pools are per-agent only, §3) but are
    /// accepted for parity with the spec surface and future logging.
    pub async fn get_process(
        &self,
        _source: &str,
        _channel: &str,
        agent: &Agent,
        pool_size: usize,
    ) -> orc_domain::Result<Acquired> {
        let spec = self.spawn_spec(agent);
        self.pool
            .get_available_process(&agent.agent_id, pool_size, || async move { AgentProcess::spawn(&spec) })
            .await
    }

    pub fn release_process(&self, agent: &Agent, id: u64) {
        self.pool.release_process(&agent.agent_id, id);
    }

    pub fn pool(&self) -> &AgentProcessPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn manager() -> AgentProcessManager {
        AgentProcessManager::new(AgentProcessPool::new(Duration::from_secs(60)), "rules,agents")
    }

    fn agent(tier: Option<Tier>) -> Agent {
        Agent {
            agent_id: "a".into(),
            display_name: "A".into(),
            trigger_prefix: None,
            tier,
            can_delegate: None,
            is_planning_agent: None,
            auto_continue: None,
            tool_permissions: None,
            auto_respond_keywords: vec![],
            pool_size: None,
            enabled: true,
            model: Some("gpt".into()),
            command: Some("cat".into()),
            working_dir: None,
        }
    }

    #[test]
    fn tier_one_gets_hook_features_not_disable() {
        let mgr = manager();
        let env = mgr.tier_env(Tier::One);
        assert_eq!(env.get("MAMA_HOOK_FEATURES"), Some(&"rules,agents".to_string()));
        assert!(!env.contains_key("MAMA_DISABLE_HOOKS"));
    }

    #[test]
    fn tier_two_and_three_disable_hooks_not_features() {
        let mgr = manager();
        for tier in [Tier::Two, Tier::Three] {
            let env = mgr.tier_env(tier);
            assert_eq!(env.get("MAMA_DISABLE_HOOKS"), Some(&"true".to_string()));
            assert!(!env.contains_key("MAMA_HOOK_FEATURES"));
        }
    }

    #[test]
    fn missing_tier_defaults_to_tier_one_env() {
        let mgr = manager();
        let a = agent(None);
        let env = mgr.tier_env(a.tier.unwrap_or(Tier::One));
        assert!(env.contains_key("MAMA_HOOK_FEATURES"));
    }

    #[tokio::test]
    async fn get_process_then_release_round_trips_through_the_pool() {
        let mgr = manager();
        let a = agent(Some(Tier::One));
        let acquired = mgr.get_process("chat", "c1", &a, 2).await.unwrap();
        assert!(acquired.is_new);
        mgr.release_process(&a, acquired.id);
        assert_eq!(mgr.pool().idle_count("a"), 1);
        mgr.pool().stop_agent("a").await;
    }
}
