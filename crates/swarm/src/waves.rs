//! Wave Engine (§4.13): stateless sequential-wave, parallel-within-wave
//! execution with fail-forward semantics. Grounded on the DAG
//! executor's wave-by-wave concurrent dispatch in the swarm example,
//! simplified to match the spec: no per-wave concurrency cap, no
//! timeouts — those belong to the task runner, not this engine.

use async_trait::async_trait;
use futures_util::future::join_all;

use crate::db::SwarmDb;
use orc_domain::Result;

#[derive(Debug, Clone)]
pub struct TaskRef {
    pub id: String,
    pub description: String,
    pub category: String,
}

#[derive(Debug, Clone)]
pub struct Wave {
    pub wave: i64,
    pub tasks: Vec<TaskRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct WaveTaskResult {
    pub task_id: String,
    pub wave: i64,
    pub outcome: TaskOutcome,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct WaveRunSummary {
    pub total_waves: usize,
    pub completed_waves: usize,
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<WaveTaskResult>,
}

/// The unit of work a wave engine calls per claimed task. Implementors
/// typically delegate to an `AgentProcessManager` + `AgentProcess`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &TaskRef) -> Result<String>;
}

/// Runs `waves` sorted ascending by `wave`, claiming each task in a
/// wave before launching it; unclaimed (raced) tasks are skipped.
/// Every task in a wave runs concurrently; a failure never stops
/// sibling tasks or later waves (fail-forward).
pub async fn run_waves(db: &SwarmDb, waves: &[Wave], executor: &dyn TaskExecutor) -> WaveRunSummary {
    let mut sorted: Vec<&Wave> = waves.iter().collect();
    sorted.sort_by_key(|w| w.wave);

    let mut summary = WaveRunSummary::default();
    summary.total_waves = sorted.len();

    for wave in sorted {
        summary.total_tasks += wave.tasks.len();
        if wave.tasks.is_empty() {
            summary.completed_waves += 1;
            continue;
        }

        let mut claimed = Vec::new();
        for task in &wave.tasks {
            match db.claim_task(&task.id, "wave-engine").await {
                Ok(true) => claimed.push(task.clone()),
                _ => {
                    summary.skipped += 1;
                    summary.results.push(WaveTaskResult {
                        task_id: task.id.clone(),
                        wave: wave.wave,
                        outcome: TaskOutcome::Skipped,
                        error: None,
                    });
                }
            }
        }

        let futures = claimed.iter().map(|task| async move {
            let outcome = executor.execute(task).await;
            (task.clone(), outcome)
        });
        let outcomes = join_all(futures).await;

        for (task, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    let _ = db.complete_task(&task.id, Some(result)).await;
                    summary.completed += 1;
                    summary.results.push(WaveTaskResult {
                        task_id: task.id,
                        wave: wave.wave,
                        outcome: TaskOutcome::Completed,
                        error: None,
                    });
                }
                Err(e) => {
                    let _ = db.fail_task(&task.id, Some(e.to_string())).await;
                    summary.failed += 1;
                    summary.results.push(WaveTaskResult {
                        task_id: task.id,
                        wave: wave.wave,
                        outcome: TaskOutcome::Failed,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        summary.completed_waves += 1;
    }

    summary
}
