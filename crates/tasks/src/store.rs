//! Background Task Manager (§4.10): a bounded FIFO pending queue, a
//! running set, and a capped completed/failed history, with per-agent
//! and global concurrency caps.
//!
//! The spec's "processing loop triggered via microtask on every
//! mutation" becomes a pull-based `try_dispatch`/`complete`/`fail` API
//! here: callers (or `run_with`, below) ask for the next batch of
//! dispatchable tasks after every state change instead of a task
//! manager owning its own executor callbacks — the same invariants, a
//! shape that doesn't fight Rust's ownership rules.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orc_domain::{Error, Event, EventBus, Result};
use parking_lot::RwLock;

const RETENTION_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BackgroundTask {
    pub id: String,
    pub description: String,
    pub prompt: String,
    pub agent_id: String,
    pub requested_by: String,
    pub channel_id: String,
    pub source: String,
    pub status: TaskStatus,
    pub queued_at: Instant,
    #[serde(skip)]
    pub started_at: Option<Instant>,
    #[serde(skip)]
    pub completed_at: Option<Instant>,
    pub duration_ms: Option<u64>,
    pub result: Option<String>,
    pub error: Option<String>,
    /// Set by `cancel_task` on a running task; a late `complete`/`fail`
    /// call for this id is ignored rather than overwriting the status.
    #[serde(skip)]
    cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub total_submitted: usize,
}

struct State {
    tasks: HashMap<String, BackgroundTask>,
    pending: VecDeque<String>,
    running: std::collections::HashSet<String>,
    /// Terminal ids, newest first (front = most recent).
    history: VecDeque<String>,
    total_submitted: usize,
    next_seq: u64,
}

pub struct BackgroundTaskManager {
    state: RwLock<State>,
    max_queue_size: usize,
    max_total_concurrent: usize,
    max_concurrent_per_agent: usize,
    stale_timeout: Duration,
    events: Option<EventBus>,
}

impl BackgroundTaskManager {
    pub fn new(
        max_queue_size: usize,
        max_total_concurrent: usize,
        max_concurrent_per_agent: usize,
        stale_timeout: Duration,
    ) -> Self {
        Self {
            state: RwLock::new(State {
                tasks: HashMap::new(),
                pending: VecDeque::new(),
                running: std::collections::HashSet::new(),
                history: VecDeque::new(),
                total_submitted: 0,
                next_seq: 0,
            }),
            max_queue_size,
            max_total_concurrent,
            max_concurrent_per_agent,
            stale_timeout,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn new_id(seq: u64) -> String {
        format!("bg_{seq:08x}")
    }

    /// `pending + running <= maxQueueSize`, else `QueueFull`.
    pub fn submit(
        &self,
        description: impl Into<String>,
        prompt: impl Into<String>,
        agent_id: impl Into<String>,
        requested_by: impl Into<String>,
        channel_id: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<String> {
        let mut state = self.state.write();
        if state.pending.len() + state.running.len() >= self.max_queue_size {
            return Err(Error::QueueFull(format!(
                "background queue full ({} pending + running)",
                state.pending.len() + state.running.len()
            )));
        }
        let id = Self::new_id(state.next_seq);
        state.next_seq += 1;
        state.total_submitted += 1;
        state.tasks.insert(
            id.clone(),
            BackgroundTask {
                id: id.clone(),
                description: description.into(),
                prompt: prompt.into(),
                agent_id: agent_id.into(),
                requested_by: requested_by.into(),
                channel_id: channel_id.into(),
                source: source.into(),
                status: TaskStatus::Pending,
                queued_at: Instant::now(),
                started_at: None,
                completed_at: None,
                duration_ms: None,
                result: None,
                error: None,
                cancelled: false,
            },
        );
        state.pending.push_back(id.clone());
        Ok(id)
    }

    /// Scans the pending FIFO from the head, skipping entries whose
    /// agent is at its per-agent cap so they don't starve other agents,
    /// but never exceeding the global cap. Marks every dispatched task
    /// `Running` and returns their ids for the caller to execute.
    pub fn try_dispatch(&self) -> Vec<String> {
        let mut state = self.state.write();
        let mut dispatched = Vec::new();
        let mut per_agent_running: HashMap<String, usize> = HashMap::new();
        for id in &state.running {
            if let Some(t) = state.tasks.get(id) {
                *per_agent_running.entry(t.agent_id.clone()).or_insert(0) += 1;
            }
        }

        let mut remaining = VecDeque::new();
        let mut total_running = state.running.len();

        while let Some(id) = state.pending.pop_front() {
            if total_running >= self.max_total_concurrent {
                remaining.push_back(id);
                continue;
            }
            let agent_id = state.tasks.get(&id).map(|t| t.agent_id.clone()).unwrap_or_default();
            let agent_count = *per_agent_running.get(&agent_id).unwrap_or(&0);
            if agent_count >= self.max_concurrent_per_agent {
                remaining.push_back(id);
                continue;
            }

            if let Some(t) = state.tasks.get_mut(&id) {
                t.status = TaskStatus::Running;
                t.started_at = Some(Instant::now());
            }
            state.running.insert(id.clone());
            *per_agent_running.entry(agent_id).or_insert(0) += 1;
            total_running += 1;
            dispatched.push(id);
        }
        state.pending = remaining;

        if let Some(events) = &self.events {
            for id in &dispatched {
                if let Some(t) = state.tasks.get(id) {
                    events.publish(Event::TaskStarted {
                        task_id: id.clone(),
                        agent_id: t.agent_id.clone(),
                    });
                }
            }
        }
        dispatched
    }

    fn finish(&self, id: &str, status: TaskStatus, result: Option<String>, error: Option<String>) -> bool {
        let mut state = self.state.write();
        if !state.running.remove(id) {
            return false;
        }
        let Some(task) = state.tasks.get_mut(id) else {
            return false;
        };
        if task.cancelled {
            // A late resolution after cancel_task: status stays failed/Cancelled.
            return false;
        }
        let now = Instant::now();
        task.status = status;
        task.completed_at = Some(now);
        task.duration_ms = Some(
            task.started_at
                .map(|s| now.duration_since(s).as_millis() as u64)
                .unwrap_or(0),
        );
        task.result = result;
        task.error = error;

        state.history.push_front(id.to_string());
        while state.history.len() > RETENTION_CAP {
            if let Some(evicted) = state.history.pop_back() {
                state.tasks.remove(&evicted);
            }
        }

        if let Some(events) = &self.events {
            match status {
                TaskStatus::Completed => events.publish(Event::TaskCompleted {
                    task_id: id.to_string(),
                    duration_ms: task.duration_ms.unwrap_or(0),
                }),
                TaskStatus::Failed => events.publish(Event::TaskFailed {
                    task_id: id.to_string(),
                    error: task.error.clone().unwrap_or_default(),
                }),
                _ => {}
            }
        }
        true
    }

    pub fn complete(&self, id: &str, result: String) -> bool {
        self.finish(id, TaskStatus::Completed, Some(result), None)
    }

    pub fn fail(&self, id: &str, error: String) -> bool {
        self.finish(id, TaskStatus::Failed, None, Some(error))
    }

    /// Pending: removed and marked failed/"Cancelled". Running: marked
    /// failed/"Cancelled" and removed from the running set; a later
    /// `complete`/`fail` call for the same id is a no-op (§4.10).
    /// Terminal/unknown ids return `false`.
    pub fn cancel_task(&self, id: &str) -> bool {
        let mut state = self.state.write();
        let Some(task) = state.tasks.get(id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }
        state.pending.retain(|p| p != id);
        state.running.remove(id);

        let task = state.tasks.get_mut(id).unwrap();
        task.status = TaskStatus::Failed;
        task.error = Some("Cancelled".to_string());
        task.cancelled = true;
        task.completed_at = Some(Instant::now());

        state.history.push_front(id.to_string());
        while state.history.len() > RETENTION_CAP {
            if let Some(evicted) = state.history.pop_back() {
                state.tasks.remove(&evicted);
            }
        }

        if let Some(events) = &self.events {
            events.publish(Event::TaskFailed {
                task_id: id.to_string(),
                error: "Cancelled".to_string(),
            });
        }
        true
    }

    /// Marks any running task whose age exceeds `stale_timeout` as
    /// failed ("Stale"); returns the count reaped.
    pub fn cleanup_stale(&self) -> usize {
        let stale_ids: Vec<String> = {
            let state = self.state.read();
            state
                .running
                .iter()
                .filter(|id| {
                    state
                        .tasks
                        .get(*id)
                        .and_then(|t| t.started_at)
                        .map(|s| s.elapsed() > self.stale_timeout)
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };
        for id in &stale_ids {
            self.finish(id, TaskStatus::Failed, None, Some("Stale".to_string()));
        }
        stale_ids.len()
    }

    pub fn get_task(&self, id: &str) -> Option<BackgroundTask> {
        self.state.read().tasks.get(id).cloned()
    }

    pub fn get_result(&self, id: &str) -> Option<String> {
        let state = self.state.read();
        let task = state.tasks.get(id)?;
        if task.status == TaskStatus::Completed {
            task.result.clone()
        } else {
            None
        }
    }

    pub fn queued_tasks(&self) -> Vec<BackgroundTask> {
        let state = self.state.read();
        state.pending.iter().filter_map(|id| state.tasks.get(id).cloned()).collect()
    }

    pub fn running_tasks(&self) -> Vec<BackgroundTask> {
        let state = self.state.read();
        state.running.iter().filter_map(|id| state.tasks.get(id).cloned()).collect()
    }

    /// Newest first.
    pub fn completed_tasks(&self) -> Vec<BackgroundTask> {
        let state = self.state.read();
        state.history.iter().filter_map(|id| state.tasks.get(id).cloned()).collect()
    }

    pub fn stats(&self) -> Stats {
        let state = self.state.read();
        let completed = state
            .history
            .iter()
            .filter(|id| state.tasks.get(*id).map(|t| t.status == TaskStatus::Completed).unwrap_or(false))
            .count();
        let failed = state
            .history
            .iter()
            .filter(|id| state.tasks.get(*id).map(|t| t.status == TaskStatus::Failed).unwrap_or(false))
            .count();
        Stats {
            pending: state.pending.len(),
            running: state.running.len(),
            completed,
            failed,
            total_submitted: state.total_submitted,
        }
    }

    /// Repeatedly dispatches and executes until the pending queue and
    /// running set both drain, using `executor` to run one task at a
    /// time. Demonstration/integration convenience — the core unit
    /// tests exercise `try_dispatch`/`complete`/`fail` directly.
    pub async fn run_with<F, Fut>(self: &Arc<Self>, executor: F)
    where
        F: Fn(BackgroundTask) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<String, String>> + Send + 'static,
    {
        loop {
            let dispatched = self.try_dispatch();
            if dispatched.is_empty() {
                let stats = self.stats();
                if stats.pending == 0 && stats.running == 0 {
                    break;
                }
                tokio::task::yield_now().await;
                continue;
            }
            let mut handles = Vec::new();
            for id in dispatched {
                let Some(task) = self.get_task(&id) else { continue };
                let executor = executor.clone();
                let this = self.clone();
                handles.push(tokio::spawn(async move {
                    match executor(task).await {
                        Ok(result) => {
                            this.complete(&id, result);
                        }
                        Err(error) => {
                            this.fail(&id, error);
                        }
                    }
                }));
            }
            for h in handles {
                let _ = h.await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_queue: usize, max_total: usize, max_per_agent: usize) -> BackgroundTaskManager {
        BackgroundTaskManager::new(max_queue, max_total, max_per_agent, Duration::from_secs(600))
    }

    #[test]
    fn submit_over_queue_size_fails() {
        let mgr = manager(1, 5, 5);
        mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        let err = mgr.submit("d", "p", "a", "u", "c", "s");
        assert!(matches!(err, Err(Error::QueueFull(_))));
    }

    #[test]
    fn dispatch_respects_global_cap() {
        let mgr = manager(10, 1, 10);
        mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        mgr.submit("d", "p", "b", "u", "c", "s").unwrap();
        let dispatched = mgr.try_dispatch();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(mgr.stats().pending, 1);
    }

    #[test]
    fn per_agent_cap_does_not_starve_other_agents() {
        let mgr = manager(10, 10, 1);
        let a1 = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        let _a2 = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        let b1 = mgr.submit("d", "p", "b", "u", "c", "s").unwrap();

        let dispatched = mgr.try_dispatch();
        // a's second task is blocked by its own per-agent cap, but b1
        // must still be dispatched in the same pass.
        assert!(dispatched.contains(&a1));
        assert!(dispatched.contains(&b1));
        assert_eq!(dispatched.len(), 2);
        assert_eq!(mgr.stats().pending, 1);
    }

    #[test]
    fn complete_and_fail_are_terminal_and_retention_capped() {
        let mgr = manager(200, 200, 200);
        for i in 0..60 {
            let id = mgr.submit("d", format!("p{i}"), "a", "u", "c", "s").unwrap();
            mgr.try_dispatch();
            mgr.complete(&id, "ok".into());
        }
        assert!(mgr.completed_tasks().len() <= 50);
        assert_eq!(mgr.stats().completed, 50);
    }

    #[test]
    fn cancel_pending_task() {
        let mgr = manager(10, 0, 10);
        let id = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        assert!(mgr.cancel_task(&id));
        let task = mgr.get_task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("Cancelled"));
    }

    #[test]
    fn cancel_running_task_then_late_completion_is_ignored() {
        let mgr = manager(10, 10, 10);
        let id = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        mgr.try_dispatch();
        assert!(mgr.cancel_task(&id));
        // Late resolution from an in-flight executor must not flip status.
        assert!(!mgr.complete(&id, "late".into()));
        let task = mgr.get_task(&id).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.result, None);
    }

    #[test]
    fn cancel_of_terminal_or_unknown_returns_false() {
        let mgr = manager(10, 10, 10);
        let id = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        mgr.try_dispatch();
        mgr.complete(&id, "ok".into());
        assert!(!mgr.cancel_task(&id));
        assert!(!mgr.cancel_task("bg_ffffffff"));
    }

    #[test]
    fn cleanup_stale_reaps_old_running_tasks() {
        let mgr = BackgroundTaskManager::new(10, 10, 10, Duration::from_millis(1));
        let id = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        mgr.try_dispatch();
        std::thread::sleep(Duration::from_millis(10));
        let reaped = mgr.cleanup_stale();
        assert_eq!(reaped, 1);
        assert_eq!(mgr.get_task(&id).unwrap().error.as_deref(), Some("Stale"));
    }

    #[test]
    fn get_result_only_returns_for_completed() {
        let mgr = manager(10, 10, 10);
        let id = mgr.submit("d", "p", "a", "u", "c", "s").unwrap();
        mgr.try_dispatch();
        assert_eq!(mgr.get_result(&id), None);
        mgr.fail(&id, "boom".into());
        assert_eq!(mgr.get_result(&id), None);
    }
}
