use serde::Serialize;

/// Structured lifecycle events emitted across the orchestration core.
///
/// Every variant here corresponds to a named event in the component
/// design (`task-started`, `file-conflict`, `step-completed`, ...),
/// plus a handful of internal ones operators care about (pool
/// exhaustion, lane clears, delegation). `.emit()` is the durable sink:
/// it always logs through `tracing`, tagged so it's greppable as a
/// single event stream. `EventBus` is the optional live fan-out for
/// in-process subscribers (a UI, a test) layered on top of it.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum Event {
    TaskStarted {
        task_id: String,
        agent_id: String,
    },
    TaskCompleted {
        task_id: String,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: String,
        error: String,
    },
    TaskDeferred {
        task_id: String,
    },
    TaskRetried {
        task_id: String,
        attempt: u32,
        max_retries: u32,
    },
    SessionComplete {
        session_id: String,
    },
    FileConflict {
        task_id: String,
        shared_files: Vec<String>,
        conflicting_task_ids: Vec<String>,
    },
    StepStarted {
        execution_id: String,
        step_id: String,
    },
    StepCompleted {
        execution_id: String,
        step_id: String,
        duration_ms: u64,
        ok: bool,
    },
    WorkflowCompleted {
        execution_id: String,
        status: String,
    },
    Progress {
        scope: String,
        message: String,
    },
    PoolExhausted {
        agent_id: String,
        busy: usize,
        max: usize,
    },
    LaneCleared {
        lane: String,
        rejected: usize,
    },
    DelegationExecuted {
        from_agent_id: String,
        to_agent_id: String,
        success: bool,
    },
    ContinuationTriggered {
        agent_id: String,
        channel: String,
        attempt: u32,
    },
}

impl Event {
    /// Log this event through `tracing` as a single, greppable JSON line.
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(orc_event = %json, "orc_event");
    }
}

/// Thin wrapper over a broadcast channel so in-process subscribers can
/// observe the same events live, without displacing `tracing` as the
/// always-on sink. Lagging subscribers silently miss events rather than
/// blocking publishers — callers that need every event should read the
/// tracing output instead.
#[derive(Clone)]
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish to `tracing` and to any live subscribers.
    pub fn publish(&self, event: Event) {
        event.emit();
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
