//! Delegation Manager (§4.8): parses `DELEGATE::<target>::<task>`
//! directives, validates them against tier/enablement/cycle rules, and
//! drives the handoff through caller-supplied callbacks.

use std::collections::HashSet;

use orc_domain::model::Agent;
use orc_domain::{Event, EventBus};
use parking_lot::Mutex;
use regex::Regex;

/// A parsed `DELEGATE::<to>::<task>` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationRequest {
    pub from_agent_id: String,
    pub to_agent_id: String,
    pub task: String,
    pub original_content: String,
}

pub struct DelegationOutcome {
    pub success: bool,
    pub error: Option<String>,
}

/// Result of `executeCb`: the target agent's response plus how long it
/// took.
pub struct DelegationExecution {
    pub response: String,
    pub duration_ms: u64,
}

fn delegate_regex() -> Regex {
    // Target may contain hyphens; task is everything after the third
    // `::` up to the end of the line the directive appears on.
    Regex::new(r"(?m)^DELEGATE::([A-Za-z0-9_-]+)::(.+)$").expect("static pattern")
}

pub struct DelegationManager {
    active: Mutex<HashSet<(String, String)>>,
    events: Option<EventBus>,
}

impl DelegationManager {
    pub fn new() -> Self {
        Self { active: Mutex::new(HashSet::new()), events: None }
    }

    pub fn with_events(events: EventBus) -> Self {
        Self { active: Mutex::new(HashSet::new()), events: Some(events) }
    }

    /// Finds the first `DELEGATE::<target>::<task>` line in `response`,
    /// if any, and strips it from the returned `original_content`.
    pub fn parse_delegation(&self, from_agent_id: &str, response: &str) -> Option<DelegationRequest> {
        let re = delegate_regex();
        let caps = re.captures(response)?;
        let whole = caps.get(0)?.as_str();
        let to_agent_id = caps.get(1)?.as_str().to_string();
        let task = caps.get(2)?.as_str().trim().to_string();
        let original_content = response.replacen(whole, "", 1).trim().to_string();
        Some(DelegationRequest {
            from_agent_id: from_agent_id.to_string(),
            to_agent_id,
            task,
            original_content,
        })
    }

    /// `isDelegationAllowed`: both agents must be known; `to` must be
    /// enabled; `from` must satisfy `canDelegate`; no self-delegation;
    /// no delegating back into an agent that is currently delegating to
    /// you (cycle prevention across exactly one hop, per the spec's
    /// `activeDelegations` set).
    pub fn is_delegation_allowed(&self, from: Option<&Agent>, to: Option<&Agent>) -> Result<(), String> {
        let from = from.ok_or_else(|| "unknown delegating agent".to_string())?;
        let to = to.ok_or_else(|| "unknown delegation target".to_string())?;
        if !to.enabled {
            return Err(format!("{} is disabled", to.agent_id));
        }
        if !from.can_delegate() {
            return Err(format!("{} is not permitted to delegate", from.agent_id));
        }
        if from.agent_id == to.agent_id {
            return Err("cannot delegate to self".to_string());
        }
        if self.active.lock().contains(&(to.agent_id.clone(), from.agent_id.clone())) {
            return Err(format!("{} is already delegating to {}", to.agent_id, from.agent_id));
        }
        Ok(())
    }

    pub async fn execute_delegation<Exec, ExecFut, Notify>(
        &self,
        request: DelegationRequest,
        from: Option<&Agent>,
        to: Option<&Agent>,
        execute_cb: Exec,
        notify_cb: Option<Notify>,
    ) -> DelegationOutcome
    where
        Exec: FnOnce(String, String) -> ExecFut,
        ExecFut: std::future::Future<Output = Result<DelegationExecution, String>>,
        Notify: FnOnce(String),
    {
        if let Err(error) = self.is_delegation_allowed(from, to) {
            return DelegationOutcome { success: false, error: Some(error) };
        }

        let from_id = request.from_agent_id.clone();
        let to_id = request.to_agent_id.clone();
        self.active.lock().insert((from_id.clone(), to_id.clone()));

        let from_name = from.map(|a| a.display_name.as_str()).unwrap_or(from_id.as_str());
        let prompt = format!(
            "You have been delegated a task by {from_name}. Do NOT delegate further. Task: {}",
            request.task
        );

        let result = execute_cb(to_id.clone(), prompt).await;
        self.active.lock().remove(&(from_id.clone(), to_id.clone()));

        let outcome = match result {
            Ok(execution) => {
                if let Some(notify) = notify_cb {
                    notify(format!(
                        "{} completed the delegated task from {} in {}ms: {}",
                        to_id, from_id, execution.duration_ms, execution.response
                    ));
                }
                DelegationOutcome { success: true, error: None }
            }
            Err(error) => DelegationOutcome { success: false, error: Some(error) },
        };

        if let Some(events) = &self.events {
            events.publish(Event::DelegationExecuted {
                from_agent_id: from_id,
                to_agent_id: to_id,
                success: outcome.success,
            });
        }
        outcome
    }

    pub fn active_delegation_count(&self) -> usize {
        self.active.lock().len()
    }
}

impl Default for DelegationManager {
    fn default() -> Self {
        Self::new()
    }
}
