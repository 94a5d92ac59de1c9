//! Workflow plan parsing (§4.14): a fenced `workflow_plan` block
//! containing JSON, with a nested `json`-fenced body accepted, CRLF
//! tolerated, and a raw-JSON fallback when no fence is present.

use orc_domain::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralAgentDef {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub agent: EphemeralAgentDef,
    pub prompt: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub prompt_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowPlan {
    pub name: String,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub synthesis: Option<Synthesis>,
}

/// Extracts and parses the plan. Accepts, in order of preference: a
/// ` ```workflow_plan ... ``` ` fence whose body is itself a
/// ` ```json ... ``` ` fence; a plain ` ```workflow_plan ... ``` `
/// fence containing raw JSON; or, if no fence is found at all, the
/// entire input parsed as raw JSON.
pub fn parse_plan(text: &str) -> Result<WorkflowPlan> {
    let normalized = text.replace("\r\n", "\n");
    let body = extract_fenced_block(&normalized, "workflow_plan").unwrap_or(normalized.clone());
    let body = extract_fenced_block(&body, "json").unwrap_or(body);
    serde_json::from_str(body.trim()).map_err(Error::from)
}

/// Line-based fence matching so a nested fence (e.g. a `json` block
/// inside the `workflow_plan` block) doesn't get mistaken for the
/// outer closing delimiter.
fn extract_fenced_block(text: &str, label: &str) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let open_marker = format!("```{label}");
    let start = lines.iter().position(|l| l.trim_start() == open_marker)?;

    let mut depth = 1;
    for (offset, line) in lines[start + 1..].iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            if trimmed == "```" {
                depth -= 1;
            } else {
                depth += 1;
            }
            if depth == 0 {
                let end = start + 1 + offset;
                return Some(lines[start + 1..end].join("\n"));
            }
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct StepLevels {
    /// step id -> level (0-based).
    pub levels: HashMap<String, usize>,
    pub max_level: usize,
}

/// Validates the plan per §4.14 and, on success, computes each step's
/// topological level (`level = max(dep.level) + 1`).
pub fn validate_and_level(plan: &WorkflowPlan, max_ephemeral_agents: usize) -> Result<StepLevels> {
    if plan.steps.is_empty() {
        return Err(Error::ValidationError("workflow plan has no steps".into()));
    }
    if plan.steps.len() > max_ephemeral_agents {
        return Err(Error::ValidationError(format!(
            "plan has {} steps, exceeds max_ephemeral_agents {}",
            plan.steps.len(),
            max_ephemeral_agents
        )));
    }

    let mut seen_ids = HashSet::new();
    for step in &plan.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(Error::ValidationError(format!("duplicate step id {}", step.id)));
        }
        if step.agent.id.trim().is_empty() || step.agent.display_name.trim().is_empty() {
            return Err(Error::ValidationError(format!("step {} has a blank ephemeral agent id/display_name", step.id)));
        }
        if step.depends_on.contains(&step.id) {
            return Err(Error::ValidationError(format!("step {} depends on itself", step.id)));
        }
    }
    for step in &plan.steps {
        for dep in &step.depends_on {
            if !seen_ids.contains(dep.as_str()) {
                return Err(Error::ValidationError(format!("step {} depends on unknown step {dep}", step.id)));
            }
        }
    }

    // Kahn's algorithm, tracking level = max(predecessor level) + 1.
    let mut indegree: HashMap<&str, usize> = plan.steps.iter().map(|s| (s.id.as_str(), s.depends_on.len())).collect();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &plan.steps {
        for dep in &step.depends_on {
            dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
        }
    }

    let mut levels: HashMap<String, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = indegree.iter().filter(|(_, &d)| d == 0).map(|(id, _)| *id).collect();
    for id in &queue {
        levels.insert(id.to_string(), 0);
    }

    let mut visited = 0;
    let mut max_level = 0;
    while let Some(id) = queue.pop_front() {
        visited += 1;
        let level = levels[id];
        max_level = max_level.max(level);
        if let Some(deps) = dependents.get(id) {
            for &dependent in deps {
                let entry = indegree.get_mut(dependent).unwrap();
                *entry -= 1;
                let candidate_level = level + 1;
                levels
                    .entry(dependent.to_string())
                    .and_modify(|l| *l = (*l).max(candidate_level))
                    .or_insert(candidate_level);
                if *entry == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if visited != plan.steps.len() {
        return Err(Error::ValidationError("workflow plan has a dependency cycle".into()));
    }

    Ok(StepLevels { levels, max_level })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, deps: &[&str]) -> WorkflowStep {
        WorkflowStep {
            id: id.to_string(),
            agent: EphemeralAgentDef {
                id: format!("agent-{id}"),
                display_name: format!("Agent {id}"),
                backend: None,
                model: None,
                system_prompt: None,
            },
            prompt: "do it".to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            optional: false,
        }
    }

    #[test]
    fn parses_nested_json_fence_inside_workflow_plan_fence() {
        let text = "preamble\n```workflow_plan\n```json\n{\"name\":\"p\",\"steps\":[{\"id\":\"a\",\"agent\":{\"id\":\"x\",\"display_name\":\"X\"},\"prompt\":\"hi\"}]}\n```\n```\ntrailer";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.name, "p");
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn parses_raw_fence_without_nested_json_label() {
        let text = "```workflow_plan\n{\"name\":\"p\",\"steps\":[{\"id\":\"a\",\"agent\":{\"id\":\"x\",\"display_name\":\"X\"},\"prompt\":\"hi\"}]}\n```";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.name, "p");
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn falls_back_to_raw_json_without_any_fence() {
        let text = "{\"name\":\"p\",\"steps\":[{\"id\":\"a\",\"agent\":{\"id\":\"x\",\"display_name\":\"X\"},\"prompt\":\"hi\"}]}";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn handles_crlf_line_endings() {
        let text = "```workflow_plan\r\n{\"name\":\"p\",\"steps\":[{\"id\":\"a\",\"agent\":{\"id\":\"x\",\"display_name\":\"X\"},\"prompt\":\"hi\"}]}\r\n```";
        let plan = parse_plan(text).unwrap();
        assert_eq!(plan.steps.len(), 1);
    }

    #[test]
    fn rejects_empty_steps() {
        let plan = WorkflowPlan { name: "p".into(), steps: vec![], synthesis: None };
        assert!(validate_and_level(&plan, 10).is_err());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let plan = WorkflowPlan { name: "p".into(), steps: vec![step("a", &[]), step("a", &[])], synthesis: None };
        assert!(validate_and_level(&plan, 10).is_err());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let plan = WorkflowPlan { name: "p".into(), steps: vec![step("a", &["ghost"])], synthesis: None };
        assert!(validate_and_level(&plan, 10).is_err());
    }

    #[test]
    fn rejects_self_loop() {
        let plan = WorkflowPlan { name: "p".into(), steps: vec![step("a", &["a"])], synthesis: None };
        assert!(validate_and_level(&plan, 10).is_err());
    }

    #[test]
    fn rejects_cycle() {
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", &["b"]), step("b", &["a"])],
            synthesis: None,
        };
        assert!(validate_and_level(&plan, 10).is_err());
    }

    #[test]
    fn rejects_over_max_ephemeral_agents() {
        let plan = WorkflowPlan { name: "p".into(), steps: vec![step("a", &[]), step("b", &[])], synthesis: None };
        assert!(validate_and_level(&plan, 1).is_err());
    }

    #[test]
    fn rejects_blank_agent_fields() {
        let mut s = step("a", &[]);
        s.agent.display_name = "  ".to_string();
        let plan = WorkflowPlan { name: "p".into(), steps: vec![s], synthesis: None };
        assert!(validate_and_level(&plan, 10).is_err());
    }

    #[test]
    fn levels_reflect_longest_dependency_chain() {
        // a -> b -> c, and d depends on a directly: d's level must
        // still be 1, not bumped by c's depth.
        let plan = WorkflowPlan {
            name: "p".into(),
            steps: vec![step("a", &[]), step("b", &["a"]), step("c", &["b"]), step("d", &["a"])],
            synthesis: None,
        };
        let levels = validate_and_level(&plan, 10).unwrap();
        assert_eq!(levels.levels["a"], 0);
        assert_eq!(levels.levels["b"], 1);
        assert_eq!(levels.levels["c"], 2);
        assert_eq!(levels.levels["d"], 1);
        assert_eq!(levels.max_level, 2);
    }
}
