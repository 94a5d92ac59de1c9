use crate::model::{Agent, Tier};

/// Tier-2/3 read-only tool defaults (§3, §4.5): allow navigation and
/// inspection, block anything that mutates the workspace or shells out.
const READ_ONLY_ALLOW: &[&str] = &["Read", "Grep", "Glob"];
const READ_ONLY_BLOCK: &[&str] = &["Write", "Edit", "Bash", "NotebookEdit"];

/// Resolved allow/block lists for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPermissions {
    pub allowed: Vec<String>,
    pub blocked: Vec<String>,
}

/// Pure logic, no I/O — resolves and checks per-agent tool permissions
/// from tier defaults plus explicit overrides (§4.5).
pub struct ToolPermissionManager;

impl ToolPermissionManager {
    /// `resolvePermissions`. Tier 1 is unrestricted; tier 2/3 (and any
    /// unknown tier, which fails safe to tier 2) get the read-only
    /// defaults. An explicit `tool_permissions.allowed` on the agent
    /// replaces the default allow list; the default block list survives
    /// minus anything newly allowed (override wins).
    pub fn resolve_permissions(agent: &Agent) -> ToolPermissions {
        if agent.tier() == Tier::One {
            return ToolPermissions {
                allowed: vec!["*".to_string()],
                blocked: vec![],
            };
        }

        let mut allowed: Vec<String> = READ_ONLY_ALLOW.iter().map(|s| s.to_string()).collect();
        let mut blocked: Vec<String> = READ_ONLY_BLOCK.iter().map(|s| s.to_string()).collect();

        if let Some(ovr) = &agent.tool_permissions {
            let newly_allowed: Vec<String> = ovr
                .allowed
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect();
            blocked.retain(|b| !newly_allowed.contains(&b.to_ascii_lowercase()));
            allowed = ovr.allowed.clone();
        }

        ToolPermissions { allowed, blocked }
    }

    /// `isToolAllowed`. Wildcard-aware, `*` matches as a suffix or whole
    /// entry. Blocked always wins over allowed.
    pub fn is_tool_allowed(agent: &Agent, tool: &str) -> bool {
        let perms = Self::resolve_permissions(agent);
        let tool_lower = tool.to_ascii_lowercase();

        if perms.blocked.iter().any(|b| matches(b, &tool_lower)) {
            return false;
        }
        perms.allowed.iter().any(|a| matches(a, &tool_lower))
    }

    pub fn can_delegate(agent: &Agent) -> bool {
        agent.can_delegate()
    }

    pub fn can_auto_continue(agent: &Agent) -> bool {
        agent.auto_continue()
    }

    /// Human-readable bounds summary injected into an agent's prompt.
    pub fn build_permission_prompt(agent: &Agent) -> String {
        let perms = Self::resolve_permissions(agent);
        format!(
            "You are permitted to use: {}. You are not permitted to use: {}.",
            if perms.allowed.is_empty() {
                "(nothing)".to_string()
            } else {
                perms.allowed.join(", ")
            },
            if perms.blocked.is_empty() {
                "(nothing)".to_string()
            } else {
                perms.blocked.join(", ")
            }
        )
    }

    /// Text block listing which agents `from` may `DELEGATE::` to.
    /// Excludes self and disabled agents; empty for non-delegators.
    pub fn build_delegation_prompt(from: &Agent, all: &[Agent]) -> String {
        if !Self::can_delegate(from) {
            return String::new();
        }
        let targets: Vec<&str> = all
            .iter()
            .filter(|a| a.enabled && a.agent_id != from.agent_id)
            .map(|a| a.agent_id.as_str())
            .collect();
        if targets.is_empty() {
            return String::new();
        }
        format!(
            "You may delegate to the following agents using DELEGATE::<agent-id>::<task>: {}.",
            targets.join(", ")
        )
    }

    /// Platform-neutral mention-delegation text. Never names a specific
    /// chat platform; `<@USER_ID>` is the canonical mention notation (§9).
    pub fn build_mention_delegation_prompt(from: &Agent, all: &[Agent]) -> String {
        let base = Self::build_delegation_prompt(from, all);
        if base.is_empty() {
            return base;
        }
        format!(
            "{} You may also address a human directly using <@USER_ID> notation.",
            base
        )
    }
}

fn matches(pattern: &str, tool_lower: &str) -> bool {
    let p = pattern.to_ascii_lowercase();
    if p == "*" {
        return true;
    }
    if let Some(prefix) = p.strip_suffix('*') {
        return tool_lower.starts_with(prefix);
    }
    p == *tool_lower
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolPermissionOverride;

    fn agent(tier: Tier) -> Agent {
        Agent {
            agent_id: "a".into(),
            display_name: "A".into(),
            trigger_prefix: None,
            tier: Some(tier),
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

    #[test]
    fn tier_one_is_unrestricted() {
        let a = agent(Tier::One);
        assert!(ToolPermissionManager::is_tool_allowed(&a, "Bash"));
        assert!(ToolPermissionManager::is_tool_allowed(&a, "AnythingAtAll"));
    }

    #[test]
    fn tier_two_defaults_are_read_only() {
        let a = agent(Tier::Two);
        assert!(ToolPermissionManager::is_tool_allowed(&a, "Read"));
        assert!(!ToolPermissionManager::is_tool_allowed(&a, "Bash"));
        assert!(!ToolPermissionManager::is_tool_allowed(&a, "Write"));
    }

    #[test]
    fn unknown_tier_is_never_wildcard_or_empty_blocked() {
        let mut a = agent(Tier::Two);
        a.tier = None;
        assert!(!ToolPermissionManager::is_tool_allowed(&a, "Bash"));
        let perms = ToolPermissionManager::resolve_permissions(&a);
        assert!(!perms.allowed.contains(&"*".to_string()));
        assert!(!perms.blocked.is_empty());
    }

    #[test]
    fn override_allow_replaces_default_and_shrinks_blocked() {
        let mut a = agent(Tier::Two);
        a.tool_permissions = Some(ToolPermissionOverride {
            allowed: vec!["Write".into()],
        });
        // Write is now allowed (override wins), no longer blocked.
        assert!(ToolPermissionManager::is_tool_allowed(&a, "Write"));
        // Read was dropped from allow by the override.
        assert!(!ToolPermissionManager::is_tool_allowed(&a, "Read"));
        // Edit remains blocked — it wasn't newly allowed.
        assert!(!ToolPermissionManager::is_tool_allowed(&a, "Edit"));
    }

    #[test]
    fn wildcard_suffix_matches_prefix() {
        let mut a = agent(Tier::Two);
        a.tool_permissions = Some(ToolPermissionOverride {
            allowed: vec!["mcp__*".into()],
        });
        assert!(ToolPermissionManager::is_tool_allowed(&a, "mcp__search"));
        assert!(!ToolPermissionManager::is_tool_allowed(&a, "Bash"));
    }

    #[test]
    fn delegation_prompt_excludes_self_and_disabled() {
        let from = {
            let mut a = agent(Tier::One);
            a.agent_id = "lead".into();
            a.can_delegate = Some(true);
            a
        };
        let mut other = agent(Tier::Two);
        other.agent_id = "helper".into();
        let mut disabled = agent(Tier::Two);
        disabled.agent_id = "off".into();
        disabled.enabled = false;

        let prompt = ToolPermissionManager::build_delegation_prompt(
            &from,
            &[from.clone(), other, disabled],
        );
        assert!(prompt.contains("helper"));
        assert!(!prompt.contains("lead"));
        assert!(!prompt.contains("off"));
    }

    #[test]
    fn delegation_prompt_empty_for_non_delegator() {
        let from = agent(Tier::Two);
        let prompt = ToolPermissionManager::build_delegation_prompt(&from, &[from.clone()]);
        assert!(prompt.is_empty());
    }

    #[test]
    fn mention_prompt_never_names_a_platform() {
        let from = {
            let mut a = agent(Tier::One);
            a.agent_id = "lead".into();
            a.can_delegate = Some(true);
            a
        };
        let mut other = agent(Tier::Two);
        other.agent_id = "helper".into();
        let prompt =
            ToolPermissionManager::build_mention_delegation_prompt(&from, &[from.clone(), other]);
        assert!(prompt.contains("<@USER_ID>"));
        for platform in ["discord", "slack", "Discord", "Slack"] {
            assert!(!prompt.contains(platform));
        }
    }
}
