pub mod manager;
pub mod pool;
pub mod process;

pub use manager::AgentProcessManager;
pub use pool::{Acquired, AgentProcessPool};
pub use process::{AgentProcess, ProcessResponse, SpawnSpec};
