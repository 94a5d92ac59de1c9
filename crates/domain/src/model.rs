use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Privilege tier. Determines default tool access and delegation
/// eligibility; an agent's tier never changes after load (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    One,
    Two,
    Three,
}

impl Default for Tier {
    fn default() -> Self {
        Tier::One
    }
}

impl Tier {
    /// Unknown/unparseable tiers fail safe to tier 2, never tier 1.
    pub fn or_fail_safe(tier: Option<Tier>) -> Tier {
        tier.unwrap_or(Tier::Two)
    }
}

/// A configured agent. Loaded at startup, refreshed wholesale via
/// `updateAgents` (see `Registry::replace`); never mutated mid-selection —
/// callers pin a clone at the start of a cascade (§9 "dynamic agent
/// configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub display_name: String,
    #[serde(default)]
    pub trigger_prefix: Option<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub can_delegate: Option<bool>,
    #[serde(default, alias = "isPlanningAgent")]
    pub is_planning_agent: Option<bool>,
    #[serde(default, alias = "autoContinue")]
    pub auto_continue: Option<bool>,
    #[serde(default)]
    pub tool_permissions: Option<ToolPermissionOverride>,
    #[serde(default)]
    pub auto_respond_keywords: Vec<String>,
    #[serde(default)]
    pub pool_size: Option<usize>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl Agent {
    pub fn tier(&self) -> Tier {
        Tier::or_fail_safe(self.tier)
    }

    pub fn can_delegate(&self) -> bool {
        self.tier() == Tier::One && self.can_delegate.unwrap_or(false)
    }

    pub fn auto_continue(&self) -> bool {
        self.auto_continue.unwrap_or(false)
    }

    /// §4.4 / §9 open question: injection is gated on `is_planning_agent`
    /// itself, independent of `canDelegate`. Absence defaults to "tier-1
    /// delegators get it" (the narrower historical default), but an
    /// explicit flag always wins either way.
    pub fn receives_planning_injection(&self) -> bool {
        match self.is_planning_agent {
            Some(explicit) => explicit,
            None => self.tier() == Tier::One && self.can_delegate(),
        }
    }
}

/// Explicit per-agent tool allow/block override (§4.5). When present, the
/// supplied `allowed` replaces the tier default; `blocked` is the tier
/// default minus anything newly allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPermissionOverride {
    pub allowed: Vec<String>,
}

/// Opaque conversation scope. Used as the key for chain state, cooldowns,
/// continuation counters, UltraWork sessions, and lane partitioning (§3).
pub type Channel = String;

/// A single recorded agent response, used to build chain state.
#[derive(Debug, Clone)]
pub struct ChainEvent {
    pub agent_id: String,
    pub is_human: bool,
}

/// Per-channel chain + cooldown bookkeeping (§3). A human message clears
/// the chain; bot responses extend it and stamp cooldowns.
#[derive(Debug, Clone, Default)]
pub struct ChannelState {
    pub chain: VecDeque<ChainEvent>,
    pub last_human_at: Option<std::time::Instant>,
    pub last_response_at: Option<std::time::Instant>,
    pub agent_last_response_at: std::collections::HashMap<String, std::time::Instant>,
}

impl ChannelState {
    pub fn record_human(&mut self) {
        self.chain.clear();
        self.last_human_at = Some(std::time::Instant::now());
    }

    pub fn record_agent_response(&mut self, agent_id: &str) {
        self.chain.push_back(ChainEvent {
            agent_id: agent_id.to_string(),
            is_human: false,
        });
        let now = std::time::Instant::now();
        self.last_response_at = Some(now);
        self.agent_last_response_at.insert(agent_id.to_string(), now);
    }

    pub fn chain_length(&self) -> usize {
        self.chain.len()
    }
}
