use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Swarm database / runner configuration (§4.11, §4.12)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// SQLite file path (`sqlite://<path>` once opened).
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// A claim older than this is reclaimable back to pending.
    #[serde(default = "default_lease_ms")]
    pub lease_ms: i64,
    /// Retries before a failed task is left terminal.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Poll interval for `SwarmTaskRunner`.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Debounce window for auto-checkpoint saves.
    #[serde(default = "default_checkpoint_debounce_ms")]
    pub checkpoint_debounce_ms: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            lease_ms: default_lease_ms(),
            max_retries: default_max_retries(),
            poll_interval_ms: default_poll_interval_ms(),
            checkpoint_debounce_ms: default_checkpoint_debounce_ms(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("swarm.db")
}
fn default_lease_ms() -> i64 {
    5 * 60 * 1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_checkpoint_debounce_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = SwarmConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.checkpoint_debounce_ms, 5_000);
    }
}
