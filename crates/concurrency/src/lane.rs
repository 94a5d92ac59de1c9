//! Lane Manager (§4.1): key-scoped FIFO queues with per-lane
//! `maxConcurrent`, plus a two-stage session+global queueing helper.
//!
//! Each lane is a small piece of state (`active` count + a FIFO of
//! waiters) guarded by a `parking_lot::Mutex`; a waiter is released by
//! sending it a oneshot admission token when a slot frees up. This
//! mirrors the teacher's per-session `Semaphore`-backed lock map, just
//! generalized from a fixed `Semaphore(1)` to an arbitrary
//! `maxConcurrent` and an explicit queue so `clearLane` has something to
//! drain.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orc_domain::{Error, Event, EventBus, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;

type Admission = oneshot::Sender<AdmissionResult>;

#[derive(Debug)]
enum AdmissionResult {
    Granted,
    Cleared,
}

struct LaneState {
    max_concurrent: usize,
    active: usize,
    waiters: VecDeque<Admission>,
}

/// `laneKey -> lane state`. Lane names are opaque strings; see
/// `normalize_session_lane` for the `session:` prefixing rule.
pub struct LaneManager {
    lanes: Mutex<HashMap<String, Arc<Mutex<LaneState>>>>,
    default_max_concurrent: usize,
    default_session_max_concurrent: usize,
    wait_warn: Duration,
    events: Option<EventBus>,
}

impl LaneManager {
    pub fn new(default_max_concurrent: usize) -> Self {
        Self {
            lanes: Mutex::new(HashMap::new()),
            default_max_concurrent: default_max_concurrent.max(1),
            default_session_max_concurrent: 1,
            wait_warn: Duration::from_secs(5),
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_wait_warn(mut self, wait_warn: Duration) -> Self {
        self.wait_warn = wait_warn;
        self
    }

    fn lane(&self, key: &str, max_concurrent: usize) -> Arc<Mutex<LaneState>> {
        let mut lanes = self.lanes.lock();
        lanes
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LaneState {
                    max_concurrent: max_concurrent.max(1),
                    active: 0,
                    waiters: VecDeque::new(),
                }))
            })
            .clone()
    }

    /// `enqueue(laneKey, task)`. Runs `task` once the lane admits it;
    /// `on_wait(waited_ms)` fires at most once if admission takes longer
    /// than the configured warn threshold (advisory only).
    pub async fn enqueue<F, Fut, T>(
        &self,
        lane_key: &str,
        task: F,
        on_wait: Option<Box<dyn FnOnce(u64) + Send>>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let lane = self.lane(lane_key, self.default_max_concurrent);
        self.admit(&lane, on_wait).await?;

        let result = task().await;

        self.release(&lane);
        Ok(result)
    }

    /// `enqueueWithSession(sessionKey, task)`. Two-stage queueing: the
    /// task is serialized within `session:<key>` first, then within the
    /// global `main` lane.
    pub async fn enqueue_with_session<F, Fut, T>(
        &self,
        session_key: &str,
        task: F,
        on_wait: Option<Box<dyn FnOnce(u64) + Send>>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let session_lane_name = normalize_session_lane(session_key);
        let session_lane = self.lane(&session_lane_name, self.default_session_max_concurrent);
        self.admit(&session_lane, on_wait).await?;

        let main_lane = self.lane("main", self.default_max_concurrent);
        let admitted_main = self.admit(&main_lane, None).await;
        let result = match admitted_main {
            Ok(()) => {
                let out = task().await;
                self.release(&main_lane);
                Ok(out)
            }
            Err(e) => Err(e),
        };

        self.release(&session_lane);
        result
    }

    async fn admit(
        &self,
        lane: &Arc<Mutex<LaneState>>,
        on_wait: Option<Box<dyn FnOnce(u64) + Send>>,
    ) -> Result<()> {
        let rx = {
            let mut state = lane.lock();
            if state.active < state.max_concurrent {
                state.active += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                Some(rx)
            }
        };

        let Some(mut rx) = rx else {
            return Ok(());
        };

        let started = Instant::now();
        let warn_at = self.wait_warn;
        let result = if let Some(cb) = on_wait {
            tokio::select! {
                res = &mut rx => res,
                _ = tokio::time::sleep(warn_at) => {
                    cb(started.elapsed().as_millis() as u64);
                    rx.await
                }
            }
        } else {
            rx.await
        };

        match result {
            Ok(AdmissionResult::Granted) => Ok(()),
            Ok(AdmissionResult::Cleared) => {
                Err(Error::LaneCleared("lane cleared while queued".into()))
            }
            Err(_) => Err(Error::LaneCleared("lane dropped while queued".into())),
        }
    }

    fn release(&self, lane: &Arc<Mutex<LaneState>>) {
        let next = {
            let mut state = lane.lock();
            state.active = state.active.saturating_sub(1);
            if state.active < state.max_concurrent {
                state.waiters.pop_front()
            } else {
                None
            }
        };
        if let Some(tx) = next {
            let mut state = lane.lock();
            state.active += 1;
            drop(state);
            let _ = tx.send(AdmissionResult::Granted);
        }
    }

    /// Rejects every queued (not active) task in `lane_key` with
    /// `LaneCleared`; active tasks run to completion. Returns the count
    /// removed.
    pub fn clear_lane(&self, lane_key: &str) -> usize {
        let lane = {
            let lanes = self.lanes.lock();
            lanes.get(lane_key).cloned()
        };
        let Some(lane) = lane else { return 0 };

        let waiters = {
            let mut state = lane.lock();
            std::mem::take(&mut state.waiters)
        };
        let count = waiters.len();
        for tx in waiters {
            let _ = tx.send(AdmissionResult::Cleared);
        }
        if let Some(events) = &self.events {
            events.publish(Event::LaneCleared {
                lane: lane_key.to_string(),
                rejected: count,
            });
        }
        count
    }

    pub fn active_count(&self, lane_key: &str) -> usize {
        self.lanes
            .lock()
            .get(lane_key)
            .map(|l| l.lock().active)
            .unwrap_or(0)
    }

    pub fn queued_count(&self, lane_key: &str) -> usize {
        self.lanes
            .lock()
            .get(lane_key)
            .map(|l| l.lock().waiters.len())
            .unwrap_or(0)
    }
}

/// An empty session key maps to `session:main`; an already
/// `session:`-prefixed key is not re-prefixed (§4.1).
fn normalize_session_lane(session_key: &str) -> String {
    if session_key.is_empty() {
        "session:main".to_string()
    } else if session_key.starts_with("session:") {
        session_key.to_string()
    } else {
        format!("session:{session_key}")
    }
}
