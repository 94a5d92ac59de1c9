use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Lane manager configuration (§4.1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneConfig {
    /// Default `maxConcurrent` for a lane with no explicit override.
    #[serde(default = "default_max_concurrent")]
    pub default_max_concurrent: usize,
    /// Wait time (ms) past which the advisory `onWait` callback fires.
    #[serde(default = "default_wait_warn_ms")]
    pub wait_warn_ms: u64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            default_max_concurrent: default_max_concurrent(),
            wait_warn_ms: default_wait_warn_ms(),
        }
    }
}

fn default_max_concurrent() -> usize {
    1
}
fn default_wait_warn_ms() -> u64 {
    5_000
}
