//! Category Router (§4.7): regex patterns ranked by priority, routing
//! chat content to the agents responsible for that category.

use std::sync::Arc;

use orc_domain::config::CategoryDef;
use parking_lot::RwLock;
use regex::Regex;

/// A category with its patterns pre-compiled. Invalid regex are dropped
/// at compile time rather than failing the whole category (§4.6: "invalid
/// regex is swallowed and skipped").
struct CompiledCategory {
    def: CategoryDef,
    patterns: Vec<Regex>,
}

pub struct RouteResult {
    pub category: String,
    pub agent_ids: Vec<String>,
    pub matched_pattern: String,
}

/// Caches compiled regex per category; `update_categories` invalidates
/// the whole cache and recompiles from scratch.
pub struct CategoryRouter {
    compiled: RwLock<Vec<CompiledCategory>>,
}

impl CategoryRouter {
    pub fn new(categories: Vec<CategoryDef>) -> Self {
        Self {
            compiled: RwLock::new(compile_all(categories)),
        }
    }

    pub fn update_categories(&self, categories: Vec<CategoryDef>) {
        *self.compiled.write() = compile_all(categories);
    }

    /// Copy of the configured categories, sorted by priority descending.
    pub fn get_categories(&self) -> Vec<CategoryDef> {
        let mut defs: Vec<CategoryDef> = self.compiled.read().iter().map(|c| c.def.clone()).collect();
        defs.sort_by(|a, b| b.priority.cmp(&a.priority));
        defs
    }

    /// First category (by descending priority) with a pattern matching
    /// `content` case-insensitively *and* at least one of its `agent_ids`
    /// present in `available`.
    pub fn route(&self, content: &str, available: &[String]) -> Option<RouteResult> {
        let compiled = self.compiled.read();
        let mut ordered: Vec<&CompiledCategory> = compiled.iter().collect();
        ordered.sort_by(|a, b| b.def.priority.cmp(&a.def.priority));

        for category in ordered {
            let agent_ids: Vec<String> = category
                .def
                .agent_ids
                .iter()
                .filter(|id| available.iter().any(|a| a == *id))
                .cloned()
                .collect();
            if agent_ids.is_empty() {
                continue;
            }
            for (idx, re) in category.patterns.iter().enumerate() {
                if re.is_match(content) {
                    return Some(RouteResult {
                        category: category.def.name.clone(),
                        agent_ids,
                        matched_pattern: category.def.patterns[idx].clone(),
                    });
                }
            }
        }
        None
    }
}

fn compile_all(categories: Vec<CategoryDef>) -> Vec<CompiledCategory> {
    categories
        .into_iter()
        .map(|def| {
            let patterns = def
                .patterns
                .iter()
                .filter_map(|p| match Regex::new(&format!("(?i){p}")) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        tracing::warn!(category = %def.name, pattern = %p, error = %e, "invalid category pattern, skipped");
                        None
                    }
                })
                .collect();
            CompiledCategory { def, patterns }
        })
        .collect()
}

pub type SharedCategoryRouter = Arc<CategoryRouter>;
