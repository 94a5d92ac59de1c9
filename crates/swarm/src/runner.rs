//! Swarm Task Runner (§4.12): one poll loop per active session. Fetches
//! pending tasks, resolves dependencies, checks file conflicts, claims,
//! executes against the agent process pool, retries or fails, and
//! auto-stops once a session has nothing left to do.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use orc_domain::config::AgentsConfig;
use orc_domain::{Event, EventBus, MemoryProvider};
use orc_pool::AgentProcessManager;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::db::{SwarmDb, SwarmTask, SwarmTaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Retrying,
    Deferred,
    Failed,
}

pub struct SwarmTaskRunner {
    db: Arc<SwarmDb>,
    manager: Arc<AgentProcessManager>,
    agents: Arc<AgentsConfig>,
    events: EventBus,
    memory: Arc<dyn MemoryProvider>,
    max_retries: u32,
    poll_interval: Duration,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl SwarmTaskRunner {
    pub fn new(
        db: Arc<SwarmDb>,
        manager: Arc<AgentProcessManager>,
        agents: Arc<AgentsConfig>,
        events: EventBus,
        memory: Arc<dyn MemoryProvider>,
        max_retries: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            manager,
            agents,
            events,
            memory,
            max_retries,
            poll_interval,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn start_session(self: &Arc<Self>, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let token = CancellationToken::new();
        self.active.lock().insert(session_id.clone(), token.clone());

        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(this.poll_interval) => {}
                }
                if !this.active.lock().contains_key(&session_id) {
                    break;
                }
                let done = this.poll_once(&session_id).await;
                if done {
                    this.active.lock().remove(&session_id);
                    this.events.publish(Event::SessionComplete { session_id: session_id.clone() });
                    break;
                }
            }
        });
    }

    pub fn stop_session(&self, session_id: &str) {
        if let Some(token) = self.active.lock().remove(session_id) {
            token.cancel();
        }
    }

    pub fn stop_all(&self) {
        let tokens: Vec<CancellationToken> = self.active.lock().drain().map(|(_, t)| t).collect();
        for t in tokens {
            t.cancel();
        }
    }

    /// Runs exactly one poll cycle. Returns `true` once the session has
    /// no pending or claimed work left (the caller should stop
    /// polling).
    pub async fn poll_once(&self, session_id: &str) -> bool {
        let pending = match self.db.get_pending_tasks(session_id, None).await {
            Ok(p) => p,
            Err(_) => return false,
        };

        let current_wave = pending.iter().map(|t| t.wave).min();
        let this_wave: Vec<SwarmTask> = match current_wave {
            Some(w) => pending.into_iter().filter(|t| t.wave == w).collect(),
            None => Vec::new(),
        };

        let all_tasks = self.db.get_tasks_by_session(session_id).await.unwrap_or_default();
        let claimed: Vec<&SwarmTask> = all_tasks.iter().filter(|t| t.status == SwarmTaskStatus::Claimed).collect();

        for task in &this_wave {
            if let Some(status) = self.check_dependencies(&all_tasks, task).await {
                if status == RunStatus::Failed || status == RunStatus::Deferred {
                    continue;
                }
            }

            if self.has_file_conflict(task, &claimed) {
                let conflicting: Vec<String> = claimed
                    .iter()
                    .filter(|c| c.id != task.id && overlaps(&c.files_owned, &task.files_owned))
                    .map(|c| c.id.clone())
                    .collect();
                self.events.publish(Event::FileConflict {
                    task_id: task.id.clone(),
                    shared_files: task.files_owned.clone(),
                    conflicting_task_ids: conflicting,
                });
                continue;
            }

            if !self.db.claim_task(&task.id, "swarm-runner").await.unwrap_or(false) {
                continue;
            }

            self.run_claimed_task(task).await;
        }

        let remaining = self.db.get_tasks_by_session(session_id).await.unwrap_or_default();
        !remaining
            .iter()
            .any(|t| matches!(t.status, SwarmTaskStatus::Pending | SwarmTaskStatus::Claimed))
    }

    /// `None` if dependencies are satisfied and the task may proceed.
    /// `Some(RunStatus::Failed)` if a dependency failed (this task was
    /// cascade-failed). `Some(RunStatus::Deferred)` if a dependency is
    /// still pending (skip this cycle, no state change).
    async fn check_dependencies(&self, all_tasks: &[SwarmTask], task: &SwarmTask) -> Option<RunStatus> {
        if task.depends_on.is_empty() {
            return None;
        }
        for dep_id in &task.depends_on {
            let Some(dep) = all_tasks.iter().find(|t| &t.id == dep_id) else {
                continue;
            };
            if dep.status == SwarmTaskStatus::Failed {
                let _ = self
                    .db
                    .fail_task(&task.id, Some(format!("dependency {dep_id} failed")))
                    .await;
                self.events.publish(Event::TaskFailed {
                    task_id: task.id.clone(),
                    error: format!("dependency {dep_id} failed"),
                });
                return Some(RunStatus::Failed);
            }
            if dep.status != SwarmTaskStatus::Completed {
                return Some(RunStatus::Deferred);
            }
        }
        None
    }

    fn has_file_conflict(&self, task: &SwarmTask, claimed: &[&SwarmTask]) -> bool {
        claimed.iter().any(|c| c.id != task.id && overlaps(&c.files_owned, &task.files_owned))
    }

    async fn run_claimed_task(&self, task: &SwarmTask) {
        let Some(agent) = self.agents.find(&task.category).cloned() else {
            let _ = self.db.fail_task(&task.id, Some(format!("unknown agent {}", task.category))).await;
            self.events.publish(Event::TaskFailed {
                task_id: task.id.clone(),
                error: format!("unknown agent {}", task.category),
            });
            return;
        };
        let pool_size = self.agents.pool_size_for(&agent.agent_id);

        let acquired = match self.manager.get_process("swarm", &task.session_id, &agent, pool_size).await {
            Ok(a) => a,
            Err(e) => {
                let _ = self.db.defer_task(&task.id).await;
                self.events.publish(Event::TaskDeferred { task_id: task.id.clone() });
                tracing::warn!(task_id = %task.id, error = %e, "could not acquire process, deferred");
                return;
            }
        };

        let not_ready = {
            let mut guard = acquired.process.lock().await;
            !guard.is_ready()
        };
        if not_ready {
            self.manager.release_process(&agent, acquired.id);
            let _ = self.db.defer_task(&task.id).await;
            self.events.publish(Event::TaskDeferred { task_id: task.id.clone() });
            return;
        }

        let prompt = self.enrich_description(&task.description).await;

        let response = {
            let mut guard = acquired.process.lock().await;
            guard.send_message(&prompt).await
        };
        self.manager.release_process(&agent, acquired.id);

        match response {
            Ok(resp) => {
                let _ = self.db.complete_task(&task.id, Some(resp.response.clone())).await;
                self.events.publish(Event::TaskCompleted { task_id: task.id.clone(), duration_ms: 0 });
            }
            Err(e) => {
                if task.retry_count < self.max_retries {
                    let _ = self.db.retry_task(&task.id).await;
                    self.events.publish(Event::TaskRetried {
                        task_id: task.id.clone(),
                        attempt: task.retry_count + 1,
                        max_retries: self.max_retries,
                    });
                } else {
                    let _ = self.db.fail_task(&task.id, Some(e.to_string())).await;
                    self.events.publish(Event::TaskFailed { task_id: task.id.clone(), error: e.to_string() });
                }
            }
        }
    }

    /// Best-effort context injection; a memory lookup failure falls
    /// back to the raw description rather than aborting the task.
    async fn enrich_description(&self, description: &str) -> String {
        match self.memory.search(description, 5).await {
            Ok(results) if !results.is_empty() => {
                let context: Vec<String> = results
                    .iter()
                    .filter_map(|r| r.decision.clone())
                    .collect();
                if context.is_empty() {
                    description.to_string()
                } else {
                    format!("{description}\n\nRelevant prior decisions:\n{}", context.join("\n"))
                }
            }
            _ => description.to_string(),
        }
    }

    /// Runs a single task out-of-band for UI affordances (§4.12). Fails
    /// if the task doesn't belong to the session or is already claimed.
    pub async fn execute_immediate_task(&self, session_id: &str, task_id: &str) -> orc_domain::Result<RunStatus> {
        let Some(task) = self.db.get_task(task_id).await? else {
            return Err(orc_domain::Error::ValidationError(format!("unknown task {task_id}")));
        };
        if task.session_id != session_id {
            return Err(orc_domain::Error::ValidationError("task does not belong to session".into()));
        }
        if !self.db.claim_task(task_id, "immediate").await? {
            return Err(orc_domain::Error::ValidationError("could not be claimed".into()));
        }
        self.run_claimed_task(&task).await;
        let after = self.db.get_task(task_id).await?.unwrap();
        Ok(match after.status {
            SwarmTaskStatus::Completed => RunStatus::Completed,
            SwarmTaskStatus::Failed if after.retry_count > task.retry_count => RunStatus::Retrying,
            SwarmTaskStatus::Failed => RunStatus::Failed,
            SwarmTaskStatus::Pending => RunStatus::Deferred,
            SwarmTaskStatus::Claimed => RunStatus::Deferred,
        })
    }
}

fn overlaps(a: &[String], b: &[String]) -> bool {
    a.iter().any(|x| b.contains(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use orc_domain::config::AgentsConfig;
    use orc_domain::memory::NullMemoryProvider;
    use orc_pool::{AgentProcessManager, AgentProcessPool};
    use std::time::Duration as StdDuration;

    #[test]
    fn overlaps_detects_shared_files() {
        let a = vec!["src/a.rs".to_string(), "src/b.rs".to_string()];
        let b = vec!["src/b.rs".to_string()];
        assert!(overlaps(&a, &b));
        assert!(!overlaps(&a, &["src/c.rs".to_string()]));
    }

    async fn runner() -> (Arc<SwarmDb>, SwarmTaskRunner) {
        let db = Arc::new(SwarmDb::connect_memory().await.unwrap());
        let manager = Arc::new(AgentProcessManager::new(
            AgentProcessPool::new(StdDuration::from_secs(60)),
            "",
        ));
        let runner = SwarmTaskRunner::new(
            db.clone(),
            manager,
            Arc::new(AgentsConfig::default()),
            EventBus::new(16),
            Arc::new(NullMemoryProvider),
            3,
            StdDuration::from_secs(60),
        );
        (db, runner)
    }

    #[tokio::test]
    async fn poll_once_skips_task_with_incomplete_dependency() {
        let (db, runner) = runner().await;

        // Wave 5 so it's excluded from the wave `poll_once` actually
        // processes (the lowest pending wave) — it stays pending and
        // untouched, standing in for "not yet completed".
        let dep_id = db
            .create_task(crate::db::CreateTaskParams {
                session_id: "s1".into(),
                description: "dependency".into(),
                category: "worker".into(),
                wave: 5,
                priority: 0,
                ..Default::default()
            })
            .await
            .unwrap();
        let dependent_id = db
            .create_task(crate::db::CreateTaskParams {
                session_id: "s1".into(),
                description: "dependent".into(),
                category: "worker".into(),
                wave: 0,
                priority: 0,
                depends_on: vec![dep_id.clone()],
                ..Default::default()
            })
            .await
            .unwrap();

        runner.poll_once("s1").await;

        let dependent = db.get_task(&dependent_id).await.unwrap().unwrap();
        assert_eq!(dependent.status, SwarmTaskStatus::Pending);
        let dep = db.get_task(&dep_id).await.unwrap().unwrap();
        assert_eq!(dep.status, SwarmTaskStatus::Pending);
    }
}
