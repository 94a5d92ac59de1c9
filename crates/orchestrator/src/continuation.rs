//! Task Continuation Enforcer (§4.9): detects whether an agent response
//! is actually finished, or needs a continuation nudge.

use std::collections::HashMap;

use orc_domain::config::ContinuationConfig;
use orc_domain::{Event, EventBus};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContinuationReason {
    CompletionMarkerFound,
    IncompleteResponse,
    NormalResponse,
}

#[derive(Debug, Clone)]
pub struct ContinuationAnalysis {
    pub is_complete: bool,
    pub reason: ContinuationReason,
    pub attempt: u32,
    pub max_retries_reached: bool,
}

/// Per-(channel, agent) attempt counters. Switching agents within a
/// channel resets the counter (§4.9 — a continuation chain belongs to
/// one agent at a time).
pub struct TaskContinuationEnforcer {
    config: ContinuationConfig,
    state: Mutex<HashMap<String, (String, u32)>>,
    events: Option<EventBus>,
}

impl TaskContinuationEnforcer {
    pub fn new(config: ContinuationConfig) -> Self {
        Self { config, state: Mutex::new(HashMap::new()), events: None }
    }

    pub fn with_events(config: ContinuationConfig, events: EventBus) -> Self {
        Self { config, state: Mutex::new(HashMap::new()), events: Some(events) }
    }

    pub fn analyze_response(&self, agent_id: &str, channel: &str, text: &str) -> ContinuationAnalysis {
        if self.config.completion_markers.iter().any(|m| text.contains(m.as_str())) {
            self.reset(channel, agent_id);
            return ContinuationAnalysis {
                is_complete: true,
                reason: ContinuationReason::CompletionMarkerFound,
                attempt: 0,
                max_retries_reached: false,
            };
        }

        let incomplete = self.looks_unfinished(text);
        if incomplete {
            let attempt = self.bump(channel, agent_id);
            let max_retries_reached = attempt >= self.config.max_retries;
            if let Some(events) = &self.events {
                events.publish(Event::ContinuationTriggered {
                    agent_id: agent_id.to_string(),
                    channel: channel.to_string(),
                    attempt,
                });
            }
            return ContinuationAnalysis {
                is_complete: false,
                reason: ContinuationReason::IncompleteResponse,
                attempt,
                max_retries_reached,
            };
        }

        self.reset(channel, agent_id);
        ContinuationAnalysis {
            is_complete: true,
            reason: ContinuationReason::NormalResponse,
            attempt: 0,
            max_retries_reached: false,
        }
    }

    pub fn build_continuation_prompt(&self, previous: &str) -> String {
        let tail_start = previous.len().saturating_sub(200);
        // Respect char boundaries when slicing the tail.
        let mut start = tail_start;
        while start < previous.len() && !previous.is_char_boundary(start) {
            start += 1;
        }
        let tail = &previous[start..];
        format!(
            "Continue from where you left off: \"{tail}\" — emit DONE when finished."
        )
    }

    fn looks_unfinished(&self, text: &str) -> bool {
        if self.config.incomplete_patterns.iter().any(|p| text.contains(p.as_str())) {
            return true;
        }
        if text.chars().count() >= self.config.length_threshold {
            let trimmed = text.trim_end();
            if let Some(last) = trimmed.chars().last() {
                return !matches!(last, '.' | '!' | '?' | '"' | '\'' | ')' | '。' | '」');
            }
        }
        false
    }

    fn bump(&self, channel: &str, agent_id: &str) -> u32 {
        let mut state = self.state.lock();
        let entry = state.entry(channel.to_string()).or_insert_with(|| (agent_id.to_string(), 0));
        if entry.0 != agent_id {
            *entry = (agent_id.to_string(), 0);
        }
        entry.1 += 1;
        entry.1
    }

    fn reset(&self, channel: &str, agent_id: &str) {
        self.state.lock().insert(channel.to_string(), (agent_id.to_string(), 0));
    }
}
