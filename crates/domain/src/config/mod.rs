mod agents;
mod continuation;
mod lane;
mod orchestrator;
mod pool;
mod queue;
mod swarm;
mod tasks;
mod ultrawork;
mod workflow;

pub use agents::*;
pub use continuation::*;
pub use lane::*;
pub use orchestrator::*;
pub use pool::*;
pub use queue::*;
pub use swarm::*;
pub use tasks::*;
pub use ultrawork::*;
pub use workflow::*;

use serde::{Deserialize, Serialize};
use std::path::Path;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config (§10.3) — one sub-struct per component family,
// each independently testable for its defaults and independently
// overridable from TOML.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub lanes: LaneConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub message_queue: MessageQueueConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub continuation: ContinuationConfig,
    #[serde(default)]
    pub background_tasks: BackgroundTaskConfig,
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub ultrawork: UltraworkConfig,
}

impl Config {
    /// Read and parse a TOML config file. Fails on a missing file — use
    /// `load_or_default` when absence should fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        match Self::load(&path) {
            Ok(cfg) => Ok(cfg),
            Err(crate::error::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }
}
