pub mod lane;
pub mod queue;

pub use lane::LaneManager;
pub use queue::{AgentMessageQueue, DrainOutcome, QueueEntry, SendOutcome};
