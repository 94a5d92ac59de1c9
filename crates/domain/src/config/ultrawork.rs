use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// UltraWork session configuration (§4.15)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltraworkConfig {
    /// Base directory for `<sessionId>/{session.json,plan.md,...}`. `None`
    /// disables on-disk persistence (in-memory only).
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
    /// Caps per phase (planning/building/retrospective).
    #[serde(default = "default_max_steps_per_phase")]
    pub max_steps_per_phase: u32,
    /// Wall-clock cap for the whole session.
    #[serde(default = "default_max_duration_ms")]
    pub max_duration_ms: u64,
}

impl Default for UltraworkConfig {
    fn default() -> Self {
        Self {
            persist_dir: None,
            max_steps_per_phase: default_max_steps_per_phase(),
            max_duration_ms: default_max_duration_ms(),
        }
    }
}

fn default_max_steps_per_phase() -> u32 {
    20
}
fn default_max_duration_ms() -> u64 {
    60 * 60 * 1000
}
