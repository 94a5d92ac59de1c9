use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent message queue configuration (§4.2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageQueueConfig {
    /// Bound per agent; oldest entry dropped past this (§3).
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    /// Entry TTL in milliseconds (§3: 20 minutes).
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Retries before a busy entry is dropped (§4.2: 3).
    #[serde(default = "default_max_busy_retries")]
    pub max_busy_retries: u32,
}

impl Default for MessageQueueConfig {
    fn default() -> Self {
        Self {
            max_len: default_max_len(),
            ttl_ms: default_ttl_ms(),
            max_busy_retries: default_max_busy_retries(),
        }
    }
}

fn default_max_len() -> usize {
    5
}
fn default_ttl_ms() -> u64 {
    20 * 60 * 1000
}
fn default_max_busy_retries() -> u32 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = MessageQueueConfig::default();
        assert_eq!(cfg.max_len, 5);
        assert_eq!(cfg.ttl_ms, 1_200_000);
        assert_eq!(cfg.max_busy_retries, 3);
    }
}
