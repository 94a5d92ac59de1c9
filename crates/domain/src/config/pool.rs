use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent process pool configuration (§4.3, §4.4)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// An idle process older than this is stopped by `cleanup_idle_processes`.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    /// `MAMA_HOOK_FEATURES` value injected for tier-1 subprocesses.
    #[serde(default = "default_tier1_hook_features")]
    pub tier1_hook_features: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_idle_timeout_ms(),
            tier1_hook_features: default_tier1_hook_features(),
        }
    }
}

fn default_idle_timeout_ms() -> u64 {
    5 * 60 * 1000
}
fn default_tier1_hook_features() -> String {
    "rules,agents".to_string()
}
