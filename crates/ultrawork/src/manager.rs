//! UltraWork & State Manager (§4.15): drives a tier-1 lead agent through
//! either a freeform delegate-until-complete loop or the three ordered
//! phases (planning / building / retrospective), persisting state as it
//! goes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use orc_domain::config::{AgentsConfig, UltraworkConfig};
use orc_domain::model::{Agent, Tier};
use orc_domain::{Error, Event, EventBus, Result};
use orc_orchestrator::delegation::{DelegationExecution, DelegationManager, DelegationRequest};
use parking_lot::RwLock;

use crate::state::{Phase, SessionMode, SessionStatus, UltraworkSession};

const GENERIC_COMPLETION_MARKERS: &[&str] = &["DONE", "TASK_COMPLETE", "finished", "\u{2705}", "완료"];

#[async_trait]
pub trait UltraworkExecutor: Send + Sync {
    async fn execute(&self, agent_id: &str, prompt: &str) -> std::result::Result<String, String>;
}

#[async_trait]
pub trait PlanInterceptor: Send + Sync {
    async fn intercept(&self, block: &str) -> std::result::Result<String, String>;
}

fn contains_marker(text: &str, marker: &str) -> bool {
    text.contains(marker)
}

/// Finds a fenced block labelled `label`, e.g. ` ```council_plan ... ``` `.
fn extract_fenced_block(text: &str, label: &str) -> Option<String> {
    let open = format!("```{label}");
    let start = text.find(&open)? + open.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

pub struct UltraworkManager {
    config: UltraworkConfig,
    agents: AgentsConfig,
    sessions: RwLock<HashMap<String, UltraworkSession>>,
    delegation: Arc<DelegationManager>,
    events: Option<EventBus>,
}

impl UltraworkManager {
    pub fn new(config: UltraworkConfig, agents: AgentsConfig) -> Self {
        Self { config, agents, sessions: RwLock::new(HashMap::new()), delegation: Arc::new(DelegationManager::new()), events: None }
    }

    pub fn with_events(config: UltraworkConfig, agents: AgentsConfig, events: EventBus) -> Self {
        Self {
            config,
            agents,
            sessions: RwLock::new(HashMap::new()),
            delegation: Arc::new(DelegationManager::with_events(events.clone())),
            events: Some(events),
        }
    }

    /// Rejects unknown agents and non-tier-1 leads (§4.15).
    pub fn start_session(&self, session_id: &str, agent: &Agent, channel: &str, mode: SessionMode) -> Result<()> {
        if agent.tier() != Tier::One {
            return Err(Error::Unauthorized(format!("{} is not a tier-1 lead", agent.agent_id)));
        }
        let now = Utc::now();
        let session = UltraworkSession::new(session_id, agent.agent_id.clone(), channel, mode, now);
        self.persist_session(&session);
        self.sessions.write().insert(session_id.to_string(), session);
        Ok(())
    }

    pub fn stop_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write();
        if let Some(mut session) = sessions.remove(session_id) {
            session.status = SessionStatus::Stopped;
            self.persist_session(&session);
            true
        } else {
            false
        }
    }

    pub fn should_continue(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read();
        let Some(session) = sessions.get(session_id) else { return false };
        if session.status != SessionStatus::Active {
            return false;
        }
        let elapsed = Utc::now().signed_duration_since(session.started_at).num_milliseconds().max(0) as u64;
        if elapsed >= self.config.max_duration_ms {
            return false;
        }
        session.phase_step_count < self.config.max_steps_per_phase
    }

    pub fn get_session(&self, session_id: &str) -> Option<UltraworkSession> {
        self.sessions.read().get(session_id).cloned()
    }

    fn mutate<F: FnOnce(&mut UltraworkSession)>(&self, session_id: &str, f: F) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(session_id) {
            Some(session) => {
                f(session);
                true
            }
            None => false,
        }
    }

    fn record_step(&self, session_id: &str, kind: &str, description: &str) {
        self.mutate(session_id, |s| s.push_step(kind, description, Utc::now()));
    }

    fn active(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    // ── Phased execution ──────────────────────────────────────────

    pub async fn run_phased(
        self: &Arc<Self>,
        session_id: &str,
        initial_prompt: &str,
        executor: &dyn UltraworkExecutor,
        interceptor: Option<&dyn PlanInterceptor>,
    ) -> Result<UltraworkSession> {
        self.run_planning(session_id, initial_prompt, executor, interceptor).await?;
        if !self.active(session_id) || self.get_session(session_id).map(|s| s.phase) != Some(Phase::Building) {
            return self.get_session(session_id).ok_or_else(|| Error::ValidationError("session not found".into()));
        }

        self.run_building(session_id, executor).await?;
        if self.active(session_id) && self.get_session(session_id).map(|s| s.phase) == Some(Phase::Retrospective) {
            self.run_retrospective(session_id, executor).await?;
        }

        self.get_session(session_id).ok_or_else(|| Error::ValidationError("session not found".into()))
    }

    async fn run_planning(
        &self,
        session_id: &str,
        initial_prompt: &str,
        executor: &dyn UltraworkExecutor,
        interceptor: Option<&dyn PlanInterceptor>,
    ) -> Result<()> {
        let mut prompt = initial_prompt.to_string();
        while self.active(session_id) && self.should_continue(session_id) {
            let agent_id = self.get_session(session_id).unwrap().agent_id;
            let response = executor
                .execute(&agent_id, &prompt)
                .await
                .map_err(Error::Other)?;
            self.record_step(session_id, "lead_response", &response);

            let mut authoritative = response.clone();
            if let Some(block) = extract_fenced_block(&response, "council_plan") {
                if let Some(interceptor) = interceptor {
                    let result = interceptor.intercept(&block).await.map_err(Error::Other)?;
                    self.record_step(session_id, "council_execution", &result);
                    let synthesis_prompt = format!("Synthesize the council's input into the final plan:\n{result}");
                    let synthesis = executor.execute(&agent_id, &synthesis_prompt).await.map_err(Error::Other)?;
                    self.record_step(session_id, "plan_synthesis", &synthesis);
                    authoritative = synthesis;
                }
            }

            if contains_marker(&authoritative, "PLAN_COMPLETE") {
                self.mutate(session_id, |s| {
                    s.plan = Some(authoritative.clone());
                    s.enter_phase(Phase::Building, Utc::now());
                });
                self.persist_plan(session_id);
                self.emit_progress(session_id, "planning complete");
                return Ok(());
            }

            prompt = format!("Continue planning. Previous response:\n{authoritative}");
        }
        Ok(())
    }

    async fn run_building(&self, session_id: &str, executor: &dyn UltraworkExecutor) -> Result<()> {
        let plan = self.get_session(session_id).and_then(|s| s.plan.clone()).unwrap_or_default();
        let mut prompt = format!("Begin building per the plan:\n{plan}");
        while self.active(session_id) && self.should_continue(session_id) {
            let agent_id = self.get_session(session_id).unwrap().agent_id;
            let response = executor.execute(&agent_id, &prompt).await.map_err(Error::Other)?;
            self.record_step(session_id, "build_step", &response);
            self.persist_progress(session_id);

            if let Some(delegation) = self.delegation.parse_delegation(&agent_id, &response) {
                self.run_delegation(session_id, delegation, executor).await;
            }

            if contains_marker(&response, "BUILD_COMPLETE") {
                self.mutate(session_id, |s| s.enter_phase(Phase::Retrospective, Utc::now()));
                self.emit_progress(session_id, "building complete");
                return Ok(());
            }

            prompt = format!("Continue building. Previous response:\n{response}");
        }
        Ok(())
    }

    async fn run_retrospective(&self, session_id: &str, executor: &dyn UltraworkExecutor) -> Result<()> {
        loop {
            if !(self.active(session_id) && self.should_continue(session_id)) {
                return Ok(());
            }
            let agent_id = self.get_session(session_id).unwrap().agent_id;
            let prompt = "Write a retrospective of this session.".to_string();
            let response = executor.execute(&agent_id, &prompt).await.map_err(Error::Other)?;
            self.record_step(session_id, "retrospective", &response);

            if contains_marker(&response, "RETRO_INCOMPLETE") {
                let should_reenter = self.get_session(session_id).map(|s| !s.retro_reentered).unwrap_or(false);
                if should_reenter {
                    self.mutate(session_id, |s| {
                        s.retro_reentered = true;
                        s.enter_phase(Phase::Building, Utc::now());
                    });
                    self.run_building(session_id, executor).await?;
                    if self.get_session(session_id).map(|s| s.phase) == Some(Phase::Retrospective) {
                        continue;
                    }
                }
                return Ok(());
            }

            if contains_marker(&response, "RETRO_COMPLETE") {
                self.mutate(session_id, |s| {
                    s.retrospective = Some(response.clone());
                    s.phase = Phase::Completed;
                    s.status = SessionStatus::Completed;
                });
                self.persist_retrospective(session_id);
                self.emit_progress(session_id, "retrospective complete");
                return Ok(());
            }
        }
    }

    async fn run_delegation(&self, session_id: &str, request: DelegationRequest, executor: &dyn UltraworkExecutor) {
        let agent_id = request.to_agent_id.clone();
        let from = self.agents.find(&request.from_agent_id).cloned();
        let to = self.agents.find(&request.to_agent_id).cloned();
        let outcome = self
            .delegation
            .execute_delegation(
                request,
                from.as_ref(),
                to.as_ref(),
                |to, prompt| async move {
                    let start = Utc::now();
                    let response = executor.execute(&to, &prompt).await?;
                    let duration_ms = Utc::now().signed_duration_since(start).num_milliseconds().max(0) as u64;
                    Ok(DelegationExecution { response, duration_ms })
                },
                None::<fn(String)>,
            )
            .await;
        let description = match outcome.error {
            Some(error) => format!("delegation to {agent_id} failed: {error}"),
            None => format!("delegation to {agent_id} completed"),
        };
        self.record_step(session_id, "delegation", &description);
    }

    pub fn is_freeform_complete(text: &str) -> bool {
        GENERIC_COMPLETION_MARKERS.iter().any(|m| contains_marker(text, m))
    }

    pub async fn run_freeform(&self, session_id: &str, initial_prompt: &str, executor: &dyn UltraworkExecutor) -> Result<UltraworkSession> {
        let mut prompt = initial_prompt.to_string();
        while self.active(session_id) && self.should_continue(session_id) {
            let agent_id = self.get_session(session_id).unwrap().agent_id;
            let response = executor.execute(&agent_id, &prompt).await.map_err(Error::Other)?;
            self.record_step(session_id, "freeform_turn", &response);

            if let Some(delegation) = self.delegation.parse_delegation(&agent_id, &response) {
                self.run_delegation(session_id, delegation, executor).await;
            }

            if Self::is_freeform_complete(&response) {
                self.mutate(session_id, |s| {
                    s.phase = Phase::Completed;
                    s.status = SessionStatus::Completed;
                });
                break;
            }
            prompt = format!("Continue. Previous response:\n{response}");
        }
        self.get_session(session_id).ok_or_else(|| Error::ValidationError("session not found".into()))
    }

    // ── Persistence (best-effort, silent on failure unless a dir is set) ──

    fn session_dir(&self, session_id: &str) -> Option<PathBuf> {
        self.config.persist_dir.as_ref().map(|base| base.join(session_id))
    }

    fn persist_session(&self, session: &UltraworkSession) {
        let Some(dir) = self.session_dir(&session.id) else { return };
        if std::fs::create_dir_all(&dir).is_err() {
            return;
        }
        if let Ok(json) = serde_json::to_string_pretty(session) {
            let _ = std::fs::write(dir.join("session.json"), json);
        }
    }

    fn persist_plan(&self, session_id: &str) {
        let Some(session) = self.get_session(session_id) else { return };
        let Some(dir) = self.session_dir(session_id) else { return };
        if std::fs::create_dir_all(&dir).is_err() {
            return;
        }
        if let Some(plan) = &session.plan {
            let _ = std::fs::write(dir.join("plan.md"), plan);
        }
        self.persist_session(&session);
    }

    fn persist_progress(&self, session_id: &str) {
        let Some(session) = self.get_session(session_id) else { return };
        let Some(dir) = self.session_dir(session_id) else { return };
        if std::fs::create_dir_all(&dir).is_err() {
            return;
        }
        if let Ok(json) = serde_json::to_string_pretty(&session.progress) {
            let _ = std::fs::write(dir.join("progress.json"), json);
        }
    }

    fn persist_retrospective(&self, session_id: &str) {
        let Some(session) = self.get_session(session_id) else { return };
        let Some(dir) = self.session_dir(session_id) else { return };
        if std::fs::create_dir_all(&dir).is_err() {
            return;
        }
        if let Some(retro) = &session.retrospective {
            let _ = std::fs::write(dir.join("retrospective.md"), retro);
        }
        self.persist_session(&session);
    }

    fn emit_progress(&self, session_id: &str, message: &str) {
        if let Some(events) = &self.events {
            events.publish(Event::Progress { scope: session_id.to_string(), message: message.to_string() });
        }
    }
}
