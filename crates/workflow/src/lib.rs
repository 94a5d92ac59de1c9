pub mod engine;
pub mod plan;

pub use engine::{ExecutionStatus, StepResult, WorkflowEngine, WorkflowExecution, WorkflowExecutor};
pub use plan::{parse_plan, validate_and_level, EphemeralAgentDef, Synthesis, WorkflowPlan, WorkflowStep};
