use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Workflow engine configuration (§4.14)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Validation cap on `steps.len()`.
    #[serde(default = "default_max_ephemeral_agents")]
    pub max_ephemeral_agents: usize,
    /// Per-step execution timeout.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_ephemeral_agents: default_max_ephemeral_agents(),
            step_timeout_ms: default_step_timeout_ms(),
        }
    }
}

fn default_max_ephemeral_agents() -> usize {
    10
}
fn default_step_timeout_ms() -> u64 {
    5 * 60 * 1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ephemeral_cap_is_ten() {
        assert_eq!(WorkflowConfig::default().max_ephemeral_agents, 10);
    }
}
