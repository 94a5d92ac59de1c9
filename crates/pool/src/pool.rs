//! Agent Process Pool (§4.3): per-agent pools of reusable subprocess
//! handles, with acquire/release discipline and idle eviction.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::process::AgentProcess;
use orc_domain::Error;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

type Handle = Arc<AsyncMutex<AgentProcess>>;

struct AgentPoolState {
    max_size: usize,
    processes: HashMap<u64, Handle>,
    idle: VecDeque<u64>,
    idle_since: HashMap<u64, Instant>,
    busy: HashSet<u64>,
    next_id: u64,
}

impl AgentPoolState {
    fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            processes: HashMap::new(),
            idle: VecDeque::new(),
            idle_since: HashMap::new(),
            busy: HashSet::new(),
            next_id: 0,
        }
    }

    fn total(&self) -> usize {
        self.processes.len()
    }
}

/// Handle returned from `getAvailableProcess`: the process plus whether
/// it was freshly spawned.
pub struct Acquired {
    pub id: u64,
    pub process: Handle,
    pub is_new: bool,
}

pub struct AgentProcessPool {
    idle_timeout: Duration,
    pools: Mutex<HashMap<String, AgentPoolState>>,
}

impl AgentProcessPool {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// `getAvailableProcess(agent, channel, factory)` (§4.3). `factory`
    /// is only invoked when a new process must be spawned.
    pub async fn get_available_process<F, Fut>(
        &self,
        agent: &str,
        max_size: usize,
        factory: F,
    ) -> orc_domain::Result<Acquired>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = orc_domain::Result<AgentProcess>>,
    {
        // Step 1: look for a ready idle process without holding the lock
        // across an await (is_ready() needs &mut, which needs the async
        // mutex momentarily).
        let candidate_id = {
            let mut pools = self.pools.lock();
            let state = pools.entry(agent.to_string()).or_insert_with(|| AgentPoolState::new(max_size));
            state.idle.front().copied()
        };

        if let Some(id) = candidate_id {
            let handle = {
                let pools = self.pools.lock();
                pools.get(agent).and_then(|s| s.processes.get(&id)).cloned()
            };
            if let Some(handle) = handle {
                let ready = handle.lock().await.is_ready();
                let mut pools = self.pools.lock();
                let state = pools.get_mut(agent).unwrap();
                // Someone else may have raced us; only proceed if still idle.
                if state.idle.front() == Some(&id) {
                    state.idle.pop_front();
                    state.idle_since.remove(&id);
                    if ready {
                        state.busy.insert(id);
                        return Ok(Acquired {
                            id,
                            process: handle,
                            is_new: false,
                        });
                    } else {
                        state.processes.remove(&id);
                    }
                }
            }
        }

        let should_spawn = {
            let mut pools = self.pools.lock();
            let state = pools.entry(agent.to_string()).or_insert_with(|| AgentPoolState::new(max_size));
            state.total() < state.max_size
        };

        if !should_spawn {
            let (busy, max) = {
                let pools = self.pools.lock();
                let state = &pools[agent];
                (state.busy.len() + state.idle.len(), state.max_size)
            };
            return Err(Error::PoolFull {
                agent: agent.to_string(),
                busy,
                max,
            });
        }

        let process = factory().await?;
        let mut pools = self.pools.lock();
        let state = pools.entry(agent.to_string()).or_insert_with(|| AgentPoolState::new(max_size));
        let id = state.next_id;
        state.next_id += 1;
        let handle: Handle = Arc::new(AsyncMutex::new(process));
        state.processes.insert(id, handle.clone());
        state.busy.insert(id);
        Ok(Acquired {
            id,
            process: handle,
            is_new: true,
        })
    }

    /// Moves `id` from busy to idle for `agent`. Untracked ids are
    /// silently ignored.
    pub fn release_process(&self, agent: &str, id: u64) {
        let mut pools = self.pools.lock();
        if let Some(state) = pools.get_mut(agent) {
            if state.busy.remove(&id) {
                state.idle.push_back(id);
                state.idle_since.insert(id, Instant::now());
            }
        }
    }

    /// Stops and removes every idle process whose `idleSince` exceeds
    /// the configured idle timeout. Busy processes are never touched.
    pub async fn cleanup_idle_processes(&self) -> usize {
        let expired: Vec<(String, u64, Handle)> = {
            let pools = self.pools.lock();
            let mut out = Vec::new();
            for (agent, state) in pools.iter() {
                for &id in &state.idle {
                    if let Some(since) = state.idle_since.get(&id) {
                        if since.elapsed() > self.idle_timeout {
                            if let Some(h) = state.processes.get(&id) {
                                out.push((agent.clone(), id, h.clone()));
                            }
                        }
                    }
                }
            }
            out
        };

        let removed = expired.len();
        for (agent, id, handle) in expired {
            let mut pools = self.pools.lock();
            if let Some(state) = pools.get_mut(&agent) {
                state.idle.retain(|x| *x != id);
                state.idle_since.remove(&id);
                state.processes.remove(&id);
            }
            drop(pools);
            // `handle` is the last owner once the map entry above is gone.
            let process = Arc::try_unwrap(handle).ok().map(|m| m.into_inner());
            if let Some(process) = process {
                process.stop().await;
            }
        }
        removed
    }

    pub async fn stop_agent(&self, agent: &str) {
        let handles: Vec<Handle> = {
            let mut pools = self.pools.lock();
            match pools.remove(agent) {
                Some(state) => state.processes.into_values().collect(),
                None => Vec::new(),
            }
        };
        for handle in handles {
            if let Some(process) = Arc::try_unwrap(handle).ok().map(|m| m.into_inner()) {
                process.stop().await;
            }
        }
    }

    pub async fn stop_all(&self) {
        let agents: Vec<String> = self.pools.lock().keys().cloned().collect();
        for agent in agents {
            self.stop_agent(&agent).await;
        }
    }

    pub fn busy_count(&self, agent: &str) -> usize {
        self.pools.lock().get(agent).map(|s| s.busy.len()).unwrap_or(0)
    }

    pub fn idle_count(&self, agent: &str) -> usize {
        self.pools.lock().get(agent).map(|s| s.idle.len()).unwrap_or(0)
    }
}
