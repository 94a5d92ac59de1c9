//! UltraWork session orchestration: drives a tier-1 lead agent through a
//! freeform or phased (planning/building/retrospective) run, with
//! optional on-disk persistence of plan, progress, and retrospective.

pub mod manager;
pub mod state;

pub use manager::{PlanInterceptor, UltraworkExecutor, UltraworkManager};
pub use state::{Phase, ProgressStep, SessionMode, SessionStatus, UltraworkSession};
