use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Background task manager configuration (§4.10)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Background task queue limits. The 50-item completed/failed retention
/// cap is a spec invariant, not configuration — it is not a field here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundTaskConfig {
    /// `pending + running` above this fails submission with `QueueFull`.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,
    /// Global concurrency cap across all agents.
    #[serde(default = "default_max_total_concurrent")]
    pub max_total_concurrent: usize,
    /// Per-agent concurrency cap; other agents are not starved by one
    /// agent hitting this.
    #[serde(default = "default_max_concurrent_per_agent")]
    pub max_concurrent_per_agent: usize,
    /// A running task older than this is reaped by `cleanup_stale`.
    #[serde(default = "default_stale_timeout_ms")]
    pub stale_timeout_ms: u64,
}

impl Default for BackgroundTaskConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_total_concurrent: default_max_total_concurrent(),
            max_concurrent_per_agent: default_max_concurrent_per_agent(),
            stale_timeout_ms: default_stale_timeout_ms(),
        }
    }
}

impl BackgroundTaskConfig {
    pub fn clamped(&self) -> Self {
        Self {
            max_queue_size: self.max_queue_size.clamp(1, 1000),
            max_total_concurrent: self.max_total_concurrent.clamp(1, 200),
            max_concurrent_per_agent: self.max_concurrent_per_agent.clamp(1, 200),
            stale_timeout_ms: self.stale_timeout_ms.max(1_000),
        }
    }
}

fn default_max_queue_size() -> usize {
    100
}
fn default_max_total_concurrent() -> usize {
    5
}
fn default_max_concurrent_per_agent() -> usize {
    2
}
fn default_stale_timeout_ms() -> u64 {
    10 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_posture() {
        let cfg = BackgroundTaskConfig::default();
        assert_eq!(cfg.max_queue_size, 100);
        assert_eq!(cfg.max_total_concurrent, 5);
        assert_eq!(cfg.max_concurrent_per_agent, 2);
        assert_eq!(cfg.stale_timeout_ms, 600_000);
    }

    #[test]
    fn clamp_floors_and_ceilings() {
        let cfg = BackgroundTaskConfig {
            max_queue_size: 0,
            max_total_concurrent: 0,
            max_concurrent_per_agent: 0,
            stale_timeout_ms: 0,
        }
        .clamped();
        assert_eq!(cfg.max_queue_size, 1);
        assert_eq!(cfg.max_total_concurrent, 1);
        assert_eq!(cfg.max_concurrent_per_agent, 1);
        assert_eq!(cfg.stale_timeout_ms, 1_000);
    }

    #[test]
    fn deserialize_missing_fields_uses_defaults() {
        let cfg: BackgroundTaskConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.max_queue_size, 100);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = BackgroundTaskConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: BackgroundTaskConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_total_concurrent, cfg.max_total_concurrent);
    }
}
