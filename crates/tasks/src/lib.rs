pub mod store;

pub use store::{BackgroundTask, BackgroundTaskManager, Stats, TaskStatus};
