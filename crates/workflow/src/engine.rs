//! Workflow Engine (§4.14): level-ordered execution of a validated
//! plan, parallel within a level, prompt interpolation from prior
//! results, and either templated or concatenated synthesis.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::future::join_all;
use orc_domain::{Event, EventBus};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::plan::{validate_and_level, EphemeralAgentDef, WorkflowPlan};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub ok: bool,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct WorkflowExecution {
    pub id: String,
    pub plan_name: String,
    pub status: ExecutionStatus,
    pub step_results: HashMap<String, StepResult>,
    pub order: Vec<String>,
    pub synthesis: Option<String>,
}

#[async_trait]
pub trait WorkflowExecutor: Send + Sync {
    async fn execute(&self, agent: &EphemeralAgentDef, prompt: &str) -> Result<String, String>;
}

pub struct WorkflowEngine {
    events: EventBus,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl WorkflowEngine {
    pub fn new(events: EventBus) -> Self {
        Self {
            events,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn cancel(&self, execution_id: &str) -> bool {
        if let Some(token) = self.active.lock().get(execution_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub async fn run(
        self: &Arc<Self>,
        execution_id: impl Into<String>,
        plan: &WorkflowPlan,
        max_ephemeral_agents: usize,
        executor: &dyn WorkflowExecutor,
    ) -> orc_domain::Result<WorkflowExecution> {
        let execution_id = execution_id.into();
        let levels = validate_and_level(plan, max_ephemeral_agents)?;

        let token = CancellationToken::new();
        self.active.lock().insert(execution_id.clone(), token.clone());

        let mut by_level: Vec<Vec<&crate::plan::WorkflowStep>> = vec![Vec::new(); levels.max_level + 1];
        for step in &plan.steps {
            by_level[levels.levels[&step.id]].push(step);
        }

        let mut results: HashMap<String, StepResult> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut any_hard_failure = false;
        let mut cancelled = false;

        for level in by_level {
            if token.is_cancelled() {
                cancelled = true;
                break;
            }

            let prior_results = results.clone();
            let futures = level.iter().map(|step| {
                let prior_results = &prior_results;
                async move {
                    let prompt = interpolate(&step.prompt, prior_results);
                    self.events.publish(Event::StepStarted {
                        execution_id: execution_id.clone(),
                        step_id: step.id.clone(),
                    });
                    let start = Instant::now();
                    let outcome = executor.execute(&step.agent, &prompt).await;
                    let duration_ms = start.elapsed().as_millis() as u64;
                    let ok = outcome.is_ok();
                    self.events.publish(Event::StepCompleted {
                        execution_id: execution_id.clone(),
                        step_id: step.id.clone(),
                        duration_ms,
                        ok,
                    });
                    (step.id.clone(), step.optional, outcome, duration_ms)
                }
            });
            let outcomes = join_all(futures).await;

            for (step_id, optional, outcome, duration_ms) in outcomes {
                order.push(step_id.clone());
                match outcome {
                    Ok(result) => {
                        results.insert(
                            step_id.clone(),
                            StepResult { step_id, ok: true, result: Some(result), error: None, duration_ms },
                        );
                    }
                    Err(error) => {
                        if !optional {
                            any_hard_failure = true;
                        }
                        results.insert(
                            step_id.clone(),
                            StepResult { step_id, ok: false, result: None, error: Some(error), duration_ms },
                        );
                    }
                }
            }
        }

        self.active.lock().remove(&execution_id);

        let status = if cancelled {
            ExecutionStatus::Cancelled
        } else if any_hard_failure {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Completed
        };

        let synthesis = synthesize(plan, &results, &order);
        self.events.publish(Event::WorkflowCompleted {
            execution_id: execution_id.clone(),
            status: format!("{status:?}").to_lowercase(),
        });

        Ok(WorkflowExecution {
            id: execution_id,
            plan_name: plan.name.clone(),
            status,
            step_results: results,
            order,
            synthesis,
        })
    }
}

fn interpolate(prompt: &str, results: &HashMap<String, StepResult>) -> String {
    let mut out = prompt.to_string();
    for (id, result) in results {
        if let Some(text) = &result.result {
            out = out.replace(&format!("{{{{{id}.result}}}}"), text);
        }
    }
    out
}

fn synthesize(plan: &WorkflowPlan, results: &HashMap<String, StepResult>, order: &[String]) -> Option<String> {
    if let Some(synthesis) = &plan.synthesis {
        let mut out = synthesis.prompt_template.clone();
        for (id, result) in results {
            if let Some(text) = &result.result {
                out = out.replace(&format!("{{{{{id}.result}}}}"), text);
            }
        }
        Some(out)
    } else if order.is_empty() {
        None
    } else {
        Some(
            order
                .iter()
                .filter_map(|id| results.get(id).and_then(|r| r.result.clone()))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::WorkflowStep;

    fn agent_def(id: &str) -> EphemeralAgentDef {
        EphemeralAgentDef { id: id.into(), display_name: id.into(), backend: None, model: None, system_prompt: None }
    }

    fn step(id: &str, prompt: &str, deps: &[&str], optional: bool) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            agent: agent_def(id),
            prompt: prompt.to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            optional,
        }
    }

    struct EchoExecutor;
    #[async_trait]
    impl WorkflowExecutor for EchoExecutor {
        async fn execute(&self, agent: &EphemeralAgentDef, prompt: &str) -> Result<String, String> {
            Ok(format!("{}:{}", agent.id, prompt))
        }
    }

    struct FailingExecutor {
        fails: Vec<String>,
    }
    #[async_trait]
    impl WorkflowExecutor for FailingExecutor {
        async fn execute(&self, agent: &EphemeralAgentDef, _prompt: &str) -> Result<String, String> {
            if self.fails.contains(&agent.id) {
                Err("boom".to_string())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    #[tokio::test]
    async fn interpolates_prior_step_result_into_next_prompt() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![
                step("a", "start", &[], false),
                step("b", "use {{a.result}} here", &["a"], false),
            ],
            synthesis: None,
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let exec = engine.run("e1", &plan, 10, &EchoExecutor).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
        let b = &exec.step_results["b"];
        assert_eq!(b.result.as_deref(), Some("b:use a:start here"));
    }

    #[tokio::test]
    async fn missing_interpolation_token_left_in_place() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", "refers to {{ghost.result}}", &[], false)],
            synthesis: None,
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let exec = engine.run("e1", &plan, 10, &EchoExecutor).await.unwrap();
        let a = &exec.step_results["a"];
        assert!(a.result.as_ref().unwrap().contains("{{ghost.result}}"));
    }

    #[tokio::test]
    async fn required_step_failure_marks_execution_failed_but_runs_siblings() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", "p", &[], false), step("b", "p", &[], false)],
            synthesis: None,
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let executor = FailingExecutor { fails: vec!["a".to_string()] };
        let exec = engine.run("e1", &plan, 10, &executor).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.step_results["b"].ok);
    }

    #[tokio::test]
    async fn optional_step_failure_does_not_fail_execution() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", "p", &[], true)],
            synthesis: None,
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let executor = FailingExecutor { fails: vec!["a".to_string()] };
        let exec = engine.run("e1", &plan, 10, &executor).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn synthesis_template_substitutes_step_results() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", "p", &[], false)],
            synthesis: Some(crate::plan::Synthesis { prompt_template: "final: {{a.result}}".into() }),
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let exec = engine.run("e1", &plan, 10, &EchoExecutor).await.unwrap();
        assert_eq!(exec.synthesis.as_deref(), Some("final: a:p"));
    }

    #[tokio::test]
    async fn synthesis_without_template_concatenates_in_order() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", "p1", &[], false), step("b", "p2", &["a"], false)],
            synthesis: None,
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let exec = engine.run("e1", &plan, 10, &EchoExecutor).await.unwrap();
        assert_eq!(exec.synthesis.as_deref(), Some("a:p1\nb:p2"));
    }

    #[tokio::test]
    async fn cancel_before_later_level_marks_execution_cancelled() {
        struct CancellingExecutor {
            engine: Arc<WorkflowEngine>,
        }
        #[async_trait]
        impl WorkflowExecutor for CancellingExecutor {
            async fn execute(&self, _agent: &EphemeralAgentDef, _prompt: &str) -> Result<String, String> {
                self.engine.cancel("e1");
                Ok("ok".into())
            }
        }

        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", "p", &[], false), step("b", "p", &["a"], false)],
            synthesis: None,
        };
        let engine = Arc::new(WorkflowEngine::new(EventBus::default()));
        let executor = CancellingExecutor { engine: engine.clone() };
        let exec = engine.run("e1", &plan, 10, &executor).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        // Step a (level 0) still ran to completion before cancellation took effect.
        assert!(exec.step_results.contains_key("a"));
        assert!(!exec.step_results.contains_key("b"));
    }
}
