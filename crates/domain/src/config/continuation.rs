use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task continuation enforcer configuration (§4.9, §9 "culturally
// specific heuristics should be configuration-driven")
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_markers")]
    pub completion_markers: Vec<String>,
    #[serde(default = "default_incomplete_patterns")]
    pub incomplete_patterns: Vec<String>,
    /// Responses at or above this length are checked for the
    /// unfinished-sentence heuristic.
    #[serde(default = "default_length_threshold")]
    pub length_threshold: usize,
}

impl Default for ContinuationConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            completion_markers: default_completion_markers(),
            incomplete_patterns: default_incomplete_patterns(),
            length_threshold: default_length_threshold(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_completion_markers() -> Vec<String> {
    vec![
        "DONE".into(),
        "TASK_COMPLETE".into(),
        "finished".into(),
        "\u{2705}".into(), // checkmark emoji
        "완료".into(), // Korean "completed"
    ]
}

fn default_incomplete_patterns() -> Vec<String> {
    vec![
        "I'll continue".into(),
        "let me continue".into(),
        "to be continued".into(),
        "계속하겠".into(), // Korean "will continue"
        "계속할게".into(), // Korean "will keep going"
    ]
}

fn default_length_threshold() -> usize {
    1800
}
