//! Agent Message Queue (§4.2): a per-agent FIFO of pending prompts with
//! TTL and a bounded size, draining through a caller-supplied delivery
//! function that models "send to the subprocess."

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// One pending prompt for an agent.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub prompt: String,
    pub channel: String,
    pub thread: Option<String>,
    pub source: String,
    pub enqueued_at: Instant,
    pub retry_count: u32,
}

/// What the caller's `send` attempt reported back.
pub enum SendOutcome {
    Delivered(String),
    Busy,
    Error(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Nothing left to drain.
    Empty,
    /// One entry delivered.
    Delivered,
    /// Entry discarded for TTL expiry, a non-busy error, or exhausted retries.
    Discarded,
    /// Entry pushed back to the front after a busy response; draining stops.
    Requeued,
}

pub struct AgentMessageQueue {
    queues: Mutex<HashMap<String, VecDeque<QueueEntry>>>,
    max_len: usize,
    ttl: Duration,
    max_busy_retries: u32,
}

impl AgentMessageQueue {
    pub fn new(max_len: usize, ttl: Duration, max_busy_retries: u32) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            max_len: max_len.max(1),
            ttl,
            max_busy_retries,
        }
    }

    /// Enqueue, dropping the oldest entry (not the newest) once `len`
    /// would exceed `max_len` (§3).
    pub fn enqueue(&self, agent_id: &str, prompt: String, channel: String, thread: Option<String>, source: String) {
        let mut queues = self.queues.lock();
        let q = queues.entry(agent_id.to_string()).or_default();
        if q.len() >= self.max_len {
            q.pop_front();
        }
        q.push_back(QueueEntry {
            prompt,
            channel,
            thread,
            source,
            enqueued_at: Instant::now(),
            retry_count: 0,
        });
    }

    pub fn len(&self, agent_id: &str) -> usize {
        self.queues.lock().get(agent_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, agent_id: &str) -> bool {
        self.len(agent_id) == 0
    }

    /// `drain(agentId, process, deliverCb)`. Discards expired entries at
    /// the head, then sends the next one via `send`, handles busy/error
    /// per §4.2, and invokes `deliver` on success. Delivers or disposes
    /// of at most one entry per call; a caller that wants to drain the
    /// whole queue calls this in a loop until it sees `DrainOutcome::Empty`
    /// or `DrainOutcome::Requeued`, interleaving other work between calls.
    pub async fn drain_one<S, Sfut, D>(&self, agent_id: &str, send: S, deliver: D) -> DrainOutcome
    where
        S: FnOnce(String) -> Sfut,
        Sfut: std::future::Future<Output = SendOutcome>,
        D: FnOnce(&str, &QueueEntry, &str),
    {
        loop {
            let entry = {
                let mut queues = self.queues.lock();
                let q = match queues.get_mut(agent_id) {
                    Some(q) => q,
                    None => return DrainOutcome::Empty,
                };
                q.pop_front()
            };
            let Some(entry) = entry else {
                return DrainOutcome::Empty;
            };

            if entry.enqueued_at.elapsed() > self.ttl {
                continue;
            }

            return match send(entry.prompt.clone()).await {
                SendOutcome::Delivered(response) => {
                    deliver(agent_id, &entry, &response);
                    DrainOutcome::Delivered
                }
                SendOutcome::Busy => {
                    let mut entry = entry;
                    entry.retry_count += 1;
                    if entry.retry_count >= self.max_busy_retries {
                        DrainOutcome::Discarded
                    } else {
                        let mut queues = self.queues.lock();
                        queues.entry(agent_id.to_string()).or_default().push_front(entry);
                        DrainOutcome::Requeued
                    }
                }
                SendOutcome::Error(_) => DrainOutcome::Discarded,
            };
        }
    }

    /// Purge every entry past TTL across all agents.
    pub fn clear_expired(&self) -> usize {
        let mut removed = 0;
        let mut queues = self.queues.lock();
        for q in queues.values_mut() {
            let before = q.len();
            q.retain(|e| e.enqueued_at.elapsed() <= self.ttl);
            removed += before - q.len();
        }
        removed
    }

    pub fn clear_all(&self) {
        self.queues.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_drops_oldest_past_five() {
        let q = AgentMessageQueue::new(5, Duration::from_secs(1200), 3);
        for i in 0..7 {
            q.enqueue("a", format!("msg{i}"), "c".into(), None, "s".into());
        }
        assert_eq!(q.len("a"), 5);
        let remaining: Vec<String> = q
            .queues
            .lock()
            .get("a")
            .unwrap()
            .iter()
            .map(|e| e.prompt.clone())
            .collect();
        assert_eq!(remaining, vec!["msg2", "msg3", "msg4", "msg5", "msg6"]);
    }

    #[tokio::test]
    async fn drain_delivers_on_success() {
        let q = AgentMessageQueue::new(5, Duration::from_secs(1200), 3);
        q.enqueue("a", "hi".into(), "c".into(), None, "s".into());
        let delivered = std::cell::Cell::new(false);
        let outcome = q
            .drain_one(
                "a",
                |_prompt| async { SendOutcome::Delivered("ok".into()) },
                |_agent, _entry, _resp| delivered.set(true),
            )
            .await;
        assert_eq!(outcome, DrainOutcome::Delivered);
        assert!(delivered.get());
        assert_eq!(q.len("a"), 0);
    }

    #[tokio::test]
    async fn busy_requeues_to_front_until_retry_cap() {
        let q = AgentMessageQueue::new(5, Duration::from_secs(1200), 3);
        q.enqueue("a", "hi".into(), "c".into(), None, "s".into());

        for expected_attempt in 1..=2 {
            let outcome = q
                .drain_one("a", |_| async { SendOutcome::Busy }, |_, _, _| {})
                .await;
            assert_eq!(outcome, DrainOutcome::Requeued);
            let retry_count = q.queues.lock().get("a").unwrap().front().unwrap().retry_count;
            assert_eq!(retry_count, expected_attempt);
        }

        // Third busy hits max_busy_retries (3) and is dropped.
        let outcome = q
            .drain_one("a", |_| async { SendOutcome::Busy }, |_, _, _| {})
            .await;
        assert_eq!(outcome, DrainOutcome::Discarded);
        assert_eq!(q.len("a"), 0);
    }

    #[tokio::test]
    async fn expired_entries_are_skipped() {
        let q = AgentMessageQueue::new(5, Duration::from_millis(1), 3);
        q.enqueue("a", "hi".into(), "c".into(), None, "s".into());
        tokio::time::sleep(Duration::from_millis(10)).await;
        let outcome = q
            .drain_one("a", |_| async { SendOutcome::Delivered("x".into()) }, |_, _, _| {
                panic!("should not deliver an expired entry")
            })
            .await;
        assert_eq!(outcome, DrainOutcome::Empty);
    }

    #[test]
    fn clear_expired_purges_across_agents() {
        let q = AgentMessageQueue::new(5, Duration::from_millis(0), 3);
        q.enqueue("a", "hi".into(), "c".into(), None, "s".into());
        q.enqueue("b", "hi".into(), "c".into(), None, "s".into());
        std::thread::sleep(Duration::from_millis(5));
        let removed = q.clear_expired();
        assert_eq!(removed, 2);
        assert_eq!(q.len("a"), 0);
        assert_eq!(q.len("b"), 0);
    }
}
