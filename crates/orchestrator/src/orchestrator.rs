//! Orchestrator (§4.6): the agent-selection cascade run against each
//! incoming chat message.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use orc_domain::config::OrchestratorConfig;
use orc_domain::model::{Agent, ChannelState};
use parking_lot::RwLock;

use crate::router::CategoryRouter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    None,
    FreeChat,
    ExplicitTrigger,
    CategoryMatch,
    KeywordMatch,
    DefaultAgent,
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub selected_agents: Vec<String>,
    pub reason: SelectionReason,
    pub blocked: bool,
    pub block_reason: Option<String>,
}

impl SelectionResult {
    fn empty(reason: SelectionReason) -> Self {
        Self { selected_agents: Vec::new(), reason, blocked: false, block_reason: None }
    }
}

/// The message context a selection cascade runs against.
pub struct MessageContext<'a> {
    pub channel: &'a str,
    pub content: &'a str,
    pub is_human: bool,
}

/// Owns the live agent population, the orchestrator config, per-channel
/// chain/cooldown state, and the category router. Agents are replaced
/// wholesale; mid-selection, a cascade pins the population it started
/// with rather than observing a concurrent swap (§9).
pub struct Orchestrator {
    config: OrchestratorConfig,
    agents: RwLock<Vec<Agent>>,
    channels: RwLock<HashMap<String, ChannelState>>,
    router: CategoryRouter,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, agents: Vec<Agent>) -> Self {
        let router = CategoryRouter::new(config.categories.clone());
        Self { config, agents: RwLock::new(agents), channels: RwLock::new(HashMap::new()), router }
    }

    pub fn update_agents(&self, agents: Vec<Agent>) {
        *self.agents.write() = agents;
    }

    pub fn update_categories(&self, categories: Vec<orc_domain::config::CategoryDef>) {
        self.router.update_categories(categories);
    }

    pub fn select_responding_agents(&self, ctx: &MessageContext<'_>) -> SelectionResult {
        if !self.config.enabled {
            return SelectionResult::empty(SelectionReason::None);
        }

        let agents = self.agents.read().clone();
        let enabled: Vec<&Agent> = agents
            .iter()
            .filter(|a| a.enabled && !self.config.is_disabled_in(ctx.channel, &a.agent_id))
            .collect();

        if ctx.is_human {
            self.channels.write().entry(ctx.channel.to_string()).or_default().record_human();
        }

        let mut inner = self.select_inner(ctx, &enabled);

        // Chain length and cooldown gating wraps whatever the cascade
        // would otherwise have produced (§4.6 step 2): a blocked result
        // still carries the selection reason the cascade computed.
        let channels = self.channels.read();
        if let Some(state) = channels.get(ctx.channel) {
            if !ctx.is_human && state.chain_length() >= self.config.max_chain_length {
                inner.blocked = true;
                inner.block_reason = Some("max_chain_length".to_string());
                return inner;
            }
            if !ctx.is_human {
                if let Some(last) = state.last_response_at {
                    let cooldown = Duration::from_millis(self.config.global_cooldown_ms);
                    if Instant::now().duration_since(last) < cooldown {
                        inner.blocked = true;
                        inner.block_reason = Some("cooldown".to_string());
                        return inner;
                    }
                }
            }
        }
        inner
    }

    fn select_inner(&self, ctx: &MessageContext<'_>, enabled: &[&Agent]) -> SelectionResult {
        // Free chat: every enabled agent responds.
        if self.config.free_chat_for(ctx.channel) {
            return SelectionResult {
                selected_agents: enabled.iter().map(|a| a.agent_id.clone()).collect(),
                reason: SelectionReason::FreeChat,
                blocked: false,
                block_reason: None,
            };
        }

        // Explicit trigger prefix: a case-insensitive leading token.
        let lower = ctx.content.to_ascii_lowercase();
        if let Some(agent) = enabled.iter().find(|a| {
            a.trigger_prefix
                .as_deref()
                .map(|p| lower.starts_with(&p.to_ascii_lowercase()))
                .unwrap_or(false)
        }) {
            return SelectionResult {
                selected_agents: vec![agent.agent_id.clone()],
                reason: SelectionReason::ExplicitTrigger,
                blocked: false,
                block_reason: None,
            };
        }

        // Category router.
        let available: Vec<String> = enabled.iter().map(|a| a.agent_id.clone()).collect();
        if let Some(route) = self.router.route(ctx.content, &available) {
            return SelectionResult {
                selected_agents: route.agent_ids,
                reason: SelectionReason::CategoryMatch,
                blocked: false,
                block_reason: None,
            };
        }

        // Keyword fallback.
        let matches: Vec<String> = enabled
            .iter()
            .filter(|a| a.auto_respond_keywords.iter().any(|kw| lower.contains(&kw.to_ascii_lowercase())))
            .map(|a| a.agent_id.clone())
            .collect();
        if !matches.is_empty() {
            let selected = if ctx.is_human {
                vec![matches[0].clone()]
            } else {
                matches
            };
            return SelectionResult {
                selected_agents: selected,
                reason: SelectionReason::KeywordMatch,
                blocked: false,
                block_reason: None,
            };
        }

        // Default agent, channel override first.
        if let Some(default_agent) = self.config.default_agent_for(ctx.channel) {
            if enabled.iter().any(|a| a.agent_id == default_agent) {
                return SelectionResult {
                    selected_agents: vec![default_agent],
                    reason: SelectionReason::DefaultAgent,
                    blocked: false,
                    block_reason: None,
                };
            }
        }

        SelectionResult::empty(SelectionReason::None)
    }

    pub fn record_agent_response(&self, agent_id: &str, channel: &str) {
        self.channels.write().entry(channel.to_string()).or_default().record_agent_response(agent_id);
    }

    /// Removes a leading trigger-prefix token if the agent has one and
    /// the content starts with it.
    pub fn strip_trigger_prefix(content: &str, agent: &Agent) -> String {
        match &agent.trigger_prefix {
            Some(prefix) if content.to_ascii_lowercase().starts_with(&prefix.to_ascii_lowercase()) => {
                content[prefix.len()..].trim_start().to_string()
            }
            _ => content.to_string(),
        }
    }

    /// Matches a leading `**<display-name>**:` header and resolves it to
    /// the matching agent id.
    pub fn extract_agent_id_from_message(content: &str, agents: &[Agent]) -> Option<String> {
        let trimmed = content.trim_start();
        if !trimmed.starts_with("**") {
            return None;
        }
        let rest = &trimmed[2..];
        let end = rest.find("**")?;
        let name = &rest[..end];
        if !rest[end + 2..].trim_start().starts_with(':') {
            return None;
        }
        agents.iter().find(|a| a.display_name == name).map(|a| a.agent_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::config::CategoryDef;
    use orc_domain::model::Tier;

    fn agent(id: &str) -> Agent {
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
            pool_size: None,
            enabled: true,
            model: None,
            command: None,
            working_dir: None,
        }
    }

    fn ctx<'a>(channel: &'a str, content: &'a str, is_human: bool) -> MessageContext<'a> {
        MessageContext { channel, content, is_human }
    }

    #[test]
    fn disabled_orchestrator_selects_nothing_even_with_free_chat() {
        let cfg = OrchestratorConfig { enabled: false, free_chat: true, ..Default::default() };
        let orc = Orchestrator::new(cfg, vec![agent("a")]);
        let result = orc.select_responding_agents(&ctx("c1", "hi", true));
        assert_eq!(result.reason, SelectionReason::None);
        assert!(result.selected_agents.is_empty());
    }

    #[test]
    fn empty_population_selects_nothing() {
        let orc = Orchestrator::new(OrchestratorConfig::default(), vec![]);
        let result = orc.select_responding_agents(&ctx("c1", "hi", true));
        assert_eq!(result.reason, SelectionReason::None);
        assert!(result.selected_agents.is_empty());
    }

    #[test]
    fn free_chat_selects_all_enabled() {
        let cfg = OrchestratorConfig { free_chat: true, ..Default::default() };
        let orc = Orchestrator::new(cfg, vec![agent("a"), agent("b")]);
        let result = orc.select_responding_agents(&ctx("c1", "hello", true));
        assert_eq!(result.reason, SelectionReason::FreeChat);
        assert_eq!(result.selected_agents.len(), 2);
    }

    #[test]
    fn explicit_trigger_wins_over_category_and_keyword() {
        let mut triggered = agent("a");
        triggered.trigger_prefix = Some("!a".into());
        let orc = Orchestrator::new(OrchestratorConfig::default(), vec![triggered]);
        let result = orc.select_responding_agents(&ctx("c1", "!A do the thing", true));
        assert_eq!(result.reason, SelectionReason::ExplicitTrigger);
        assert_eq!(result.selected_agents, vec!["a".to_string()]);
    }

    #[test]
    fn category_match_routes_to_its_agents() {
        let cfg = OrchestratorConfig {
            categories: vec![CategoryDef { name: "bugs".into(), patterns: vec!["bug".into()], agent_ids: vec!["b".into()], priority: 1 }],
            ..Default::default()
        };
        let orc = Orchestrator::new(cfg, vec![agent("a"), agent("b")]);
        let result = orc.select_responding_agents(&ctx("c1", "found a bug", true));
        assert_eq!(result.reason, SelectionReason::CategoryMatch);
        assert_eq!(result.selected_agents, vec!["b".to_string()]);
    }

    #[test]
    fn keyword_fallback_limits_to_first_match_for_human_messages() {
        let mut a = agent("a");
        a.auto_respond_keywords = vec!["help".into()];
        let mut b = agent("b");
        b.auto_respond_keywords = vec!["help".into()];
        let orc = Orchestrator::new(OrchestratorConfig::default(), vec![a, b]);
        let result = orc.select_responding_agents(&ctx("c1", "please help me", true));
        assert_eq!(result.reason, SelectionReason::KeywordMatch);
        assert_eq!(result.selected_agents, vec!["a".to_string()]);
    }

    #[test]
    fn keyword_fallback_returns_all_for_bot_messages() {
        let mut a = agent("a");
        a.auto_respond_keywords = vec!["help".into()];
        let mut b = agent("b");
        b.auto_respond_keywords = vec!["help".into()];
        let orc = Orchestrator::new(OrchestratorConfig::default(), vec![a, b]);
        let result = orc.select_responding_agents(&ctx("c1", "please help me", false));
        assert_eq!(result.reason, SelectionReason::KeywordMatch);
        assert_eq!(result.selected_agents.len(), 2);
    }

    #[test]
    fn default_agent_used_when_nothing_else_matches() {
        let cfg = OrchestratorConfig { default_agent: Some("b".into()), ..Default::default() };
        let orc = Orchestrator::new(cfg, vec![agent("a"), agent("b")]);
        let result = orc.select_responding_agents(&ctx("c1", "nothing matches here", true));
        assert_eq!(result.reason, SelectionReason::DefaultAgent);
        assert_eq!(result.selected_agents, vec!["b".to_string()]);
    }

    #[test]
    fn channel_override_default_agent_wins_over_global() {
        let mut cfg = OrchestratorConfig { default_agent: Some("a".into()), ..Default::default() };
        cfg.channel_overrides.insert(
            "c1".into(),
            orc_domain::config::ChannelOverride { default_agent: Some("b".into()), ..Default::default() },
        );
        let orc = Orchestrator::new(cfg, vec![agent("a"), agent("b")]);
        let result = orc.select_responding_agents(&ctx("c1", "nothing matches", true));
        assert_eq!(result.selected_agents, vec!["b".to_string()]);
    }

    #[test]
    fn bot_message_blocked_past_max_chain_length() {
        let cfg = OrchestratorConfig { free_chat: true, max_chain_length: 1, ..Default::default() };
        let orc = Orchestrator::new(cfg, vec![agent("a")]);
        orc.record_agent_response("a", "c1");
        let result = orc.select_responding_agents(&ctx("c1", "hi", false));
        assert!(result.blocked);
        assert_eq!(result.block_reason.as_deref(), Some("max_chain_length"));
    }

    #[test]
    fn human_message_resets_chain_and_is_never_blocked_by_it() {
        let cfg = OrchestratorConfig { free_chat: true, max_chain_length: 1, ..Default::default() };
        let orc = Orchestrator::new(cfg, vec![agent("a")]);
        orc.record_agent_response("a", "c1");
        let result = orc.select_responding_agents(&ctx("c1", "hi", true));
        assert!(!result.blocked);
    }

    #[test]
    fn bot_message_blocked_by_cooldown() {
        let cfg = OrchestratorConfig { free_chat: true, global_cooldown_ms: 60_000, ..Default::default() };
        let orc = Orchestrator::new(cfg, vec![agent("a")]);
        orc.record_agent_response("a", "c1");
        let result = orc.select_responding_agents(&ctx("c1", "hi", false));
        assert!(result.blocked);
        assert_eq!(result.block_reason.as_deref(), Some("cooldown"));
    }

    #[test]
    fn strip_trigger_prefix_removes_leading_token() {
        let mut a = agent("a");
        a.trigger_prefix = Some("!a".into());
        assert_eq!(Orchestrator::strip_trigger_prefix("!a do it", &a), "do it");
        assert_eq!(Orchestrator::strip_trigger_prefix("no prefix", &a), "no prefix");
    }

    #[test]
    fn extract_agent_id_from_display_name_header() {
        let agents = vec![agent("a")];
        assert_eq!(
            Orchestrator::extract_agent_id_from_message("**a**: hello there", &agents),
            Some("a".to_string())
        );
        assert_eq!(Orchestrator::extract_agent_id_from_message("no header here", &agents), None);
    }
}
