//! UltraWork session state (§4.15): the freeform-vs-phased session
//! record and the on-disk shapes persisted under
//! `<base>/<sessionId>/{session.json,plan.md,progress.json,retrospective.md}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Freeform,
    Phased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Building,
    Retrospective,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Stopped,
}

/// One recorded building-phase (or freeform) step, persisted to
/// `progress.json` in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub step: u32,
    pub kind: String,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UltraworkSession {
    pub id: String,
    pub agent_id: String,
    pub channel: String,
    pub mode: SessionMode,
    pub phase: Phase,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub phase_started_at: DateTime<Utc>,
    pub phase_step_count: u32,
    /// True once retrospective has looped back into building a second
    /// time (§4.15: "re-enter Building once").
    pub retro_reentered: bool,
    pub plan: Option<String>,
    pub progress: Vec<ProgressStep>,
    pub retrospective: Option<String>,
}

impl UltraworkSession {
    pub fn new(id: impl Into<String>, agent_id: impl Into<String>, channel: impl Into<String>, mode: SessionMode, now: DateTime<Utc>) -> Self {
        let phase = match mode {
            SessionMode::Freeform => Phase::Building,
            SessionMode::Phased => Phase::Planning,
        };
        Self {
            id: id.into(),
            agent_id: agent_id.into(),
            channel: channel.into(),
            mode,
            phase,
            status: SessionStatus::Active,
            started_at: now,
            phase_started_at: now,
            phase_step_count: 0,
            retro_reentered: false,
            plan: None,
            progress: Vec::new(),
            retrospective: None,
        }
    }

    pub fn enter_phase(&mut self, phase: Phase, now: DateTime<Utc>) {
        self.phase = phase;
        self.phase_started_at = now;
        self.phase_step_count = 0;
    }

    pub fn push_step(&mut self, kind: impl Into<String>, description: impl Into<String>, now: DateTime<Utc>) {
        self.phase_step_count += 1;
        let step = self.progress.len() as u32 + 1;
        self.progress.push(ProgressStep { step, kind: kind.into(), description: description.into(), recorded_at: now });
    }
}
