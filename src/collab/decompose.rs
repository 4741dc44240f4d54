//! Task decomposer.
//!
//! Splits a coding request into ordered subtasks with dependency edges and
//! initial difficulty hints. Decomposition is template-driven: the request
//! is matched to a known shape (API service, UI, data pipeline) and falls
//! back to a generic setup/core/integration split.

use super::session::{DecompositionRequest, DecompositionResult, Difficulty, Subtask};
use crate::config::CollaborationConfig;
use std::collections::{HashMap, HashSet};

/// Validation outcome for a decomposition.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub ok: bool,
    pub issues: Vec<String>,
}

/// Platform packages recognized in prompts.
const KNOWN_PLATFORMS: &[(&str, &str)] = &[
    ("express", "express"),
    ("fastify", "fastify"),
    ("react", "react"),
    ("vue", "vue"),
    ("jwt", "jsonwebtoken"),
    ("postgres", "postgresql"),
    ("mysql", "mysql"),
    ("mongodb", "mongodb"),
    ("redis", "redis"),
    ("docker", "docker"),
];

const LANGUAGE_CUES: &[(&str, &str)] = &[
    ("typescript", "typescript"),
    ("javascript", "javascript"),
    ("python", "python"),
    ("rust", "rust"),
    ("golang", "go"),
    (" go ", "go"),
    ("java ", "java"),
    ("c#", "csharp"),
    ("html", "html"),
    ("css", "css"),
];

/// Template-driven task decomposer.
pub struct TaskDecomposer {
    config: CollaborationConfig,
}

impl TaskDecomposer {
    /// Create a decomposer with the given knobs.
    pub fn new(config: CollaborationConfig) -> Self {
        Self { config }
    }

    /// Decompose a request into ordered subtasks.
    pub fn decompose(&self, request: &DecompositionRequest) -> DecompositionResult {
        let lower = request.original_prompt.to_lowercase();
        let language = request
            .target_language
            .clone()
            .unwrap_or_else(|| detect_language(&lower));

        let (subtasks, approach) = if is_api_shaped(&lower) {
            (api_template(&language), "Layered API build: routes first, validation alongside, business logic on top, error handling last.")
        } else if is_ui_shaped(&lower) {
            (ui_template(&language), "Component-first UI build: scaffold, then state, then styling.")
        } else if is_data_shaped(&lower) {
            (data_template(&language), "Pipeline build: parse, transform, then serialize.")
        } else {
            (generic_template(&language), "Incremental build: scaffold, core implementation, integration pass.")
        };

        // An oversized template degrades to a single-task decomposition
        // rather than shipping a dependency graph with holes.
        let budget = self.config.max_subtasks.min(request.max_subtasks.max(1));
        let subtasks = if subtasks.len() > budget {
            vec![Subtask::new(
                "task_1",
                request.original_prompt.clone(),
                Difficulty::Hard,
                200,
                language,
                vec![],
            )]
        } else {
            subtasks
        };

        DecompositionResult {
            total_estimated_loc: subtasks.iter().map(|t| t.estimated_loc).sum(),
            subtasks,
            suggested_approach: approach.to_string(),
            external_dependencies: detect_platforms(&lower),
        }
    }

    /// Check the structural contract of a decomposition.
    ///
    /// Flags: over-budget subtask counts, empty decompositions, dangling
    /// dependency ids, and circular dependencies (DFS with recursion stack).
    pub fn validate(&self, decomposition: &DecompositionResult) -> ValidationReport {
        let mut issues = Vec::new();
        let subtasks = &decomposition.subtasks;

        if subtasks.is_empty() {
            issues.push("decomposition produced no subtasks".to_string());
        }

        if subtasks.len() > self.config.max_subtasks {
            issues.push(format!(
                "{} subtasks exceed the configured maximum of {}",
                subtasks.len(),
                self.config.max_subtasks
            ));
        }

        let ids: HashSet<&str> = subtasks.iter().map(|t| t.id.as_str()).collect();
        if ids.len() != subtasks.len() {
            issues.push("duplicate subtask ids".to_string());
        }

        for task in subtasks {
            for dep in &task.dependencies {
                if !ids.contains(dep.as_str()) {
                    issues.push(format!(
                        "subtask '{}' depends on unknown id '{}'",
                        task.id, dep
                    ));
                }
            }
            if task.estimated_loc == 0 {
                issues.push(format!("subtask '{}' has no size estimate", task.id));
            }
        }

        if has_cycle(subtasks) {
            issues.push("dependency graph contains a cycle".to_string());
        }

        ValidationReport {
            ok: issues.is_empty(),
            issues,
        }
    }
}

/// DFS cycle detection with an explicit recursion stack.
fn has_cycle(subtasks: &[Subtask]) -> bool {
    let adjacency: HashMap<&str, &Vec<String>> = subtasks
        .iter()
        .map(|t| (t.id.as_str(), &t.dependencies))
        .collect();

    let mut visited: HashSet<&str> = HashSet::new();
    let mut in_stack: HashSet<&str> = HashSet::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, &'a Vec<String>>,
        visited: &mut HashSet<&'a str>,
        in_stack: &mut HashSet<&'a str>,
    ) -> bool {
        if in_stack.contains(node) {
            return true;
        }
        if visited.contains(node) {
            return false;
        }
        visited.insert(node);
        in_stack.insert(node);

        if let Some(deps) = adjacency.get(node) {
            for dep in deps.iter() {
                if adjacency.contains_key(dep.as_str())
                    && visit(dep.as_str(), adjacency, visited, in_stack)
                {
                    return true;
                }
            }
        }

        in_stack.remove(node);
        false
    }

    subtasks
        .iter()
        .any(|t| visit(t.id.as_str(), &adjacency, &mut visited, &mut in_stack))
}

fn is_api_shaped(lower: &str) -> bool {
    ["api", "rest", "endpoint", "server", "backend"]
        .iter()
        .any(|cue| lower.contains(cue))
}

fn is_ui_shaped(lower: &str) -> bool {
    ["frontend", "react", "vue", "component", "page", "form", "ui "]
        .iter()
        .any(|cue| lower.contains(cue))
}

fn is_data_shaped(lower: &str) -> bool {
    ["parse", "etl", "csv", "pipeline", "transform", "scrape"]
        .iter()
        .any(|cue| lower.contains(cue))
}

fn api_template(language: &str) -> Vec<Subtask> {
    vec![
        Subtask::new(
            "task_1",
            "Define the route handlers and wire up the HTTP surface",
            Difficulty::Easy,
            40,
            language,
            vec![],
        ),
        Subtask::new(
            "task_2",
            "Implement request validation for all inputs",
            Difficulty::Easy,
            30,
            language,
            vec![],
        ),
        Subtask::new(
            "task_3",
            "Implement the business logic behind the endpoints",
            Difficulty::Hard,
            120,
            language,
            vec!["task_1".to_string(), "task_2".to_string()],
        ),
        Subtask::new(
            "task_4",
            "Add consistent error handling and response mapping",
            Difficulty::Easy,
            35,
            language,
            vec!["task_3".to_string()],
        ),
    ]
}

fn ui_template(language: &str) -> Vec<Subtask> {
    vec![
        Subtask::new(
            "task_1",
            "Scaffold the component structure and props",
            Difficulty::Easy,
            35,
            language,
            vec![],
        ),
        Subtask::new(
            "task_2",
            "Implement state management and data flow",
            Difficulty::Hard,
            90,
            language,
            vec!["task_1".to_string()],
        ),
        Subtask::new(
            "task_3",
            "Apply styling and responsive layout",
            Difficulty::Easy,
            40,
            language,
            vec!["task_1".to_string()],
        ),
    ]
}

fn data_template(language: &str) -> Vec<Subtask> {
    vec![
        Subtask::new(
            "task_1",
            "Implement input parsing with schema checks",
            Difficulty::Easy,
            45,
            language,
            vec![],
        ),
        Subtask::new(
            "task_2",
            "Implement the transformation core",
            Difficulty::Hard,
            110,
            language,
            vec!["task_1".to_string()],
        ),
        Subtask::new(
            "task_3",
            "Serialize and emit the output format",
            Difficulty::Easy,
            30,
            language,
            vec!["task_2".to_string()],
        ),
    ]
}

fn generic_template(language: &str) -> Vec<Subtask> {
    vec![
        Subtask::new(
            "task_1",
            "Set up the project scaffold and interfaces",
            Difficulty::Easy,
            25,
            language,
            vec![],
        ),
        Subtask::new(
            "task_2",
            "Implement the core functionality",
            Difficulty::Hard,
            130,
            language,
            vec!["task_1".to_string()],
        ),
        Subtask::new(
            "task_3",
            "Integrate the pieces and cover the main flows with tests",
            Difficulty::Easy,
            40,
            language,
            vec!["task_2".to_string()],
        ),
    ]
}

fn detect_language(lower: &str) -> String {
    for (cue, language) in LANGUAGE_CUES {
        if lower.contains(cue) {
            return (*language).to_string();
        }
    }
    "typescript".to_string()
}

fn detect_platforms(lower: &str) -> Vec<String> {
    KNOWN_PLATFORMS
        .iter()
        .filter(|(cue, _)| lower.contains(cue))
        .map(|(_, package)| (*package).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decomposer() -> TaskDecomposer {
        TaskDecomposer::new(CollaborationConfig::default())
    }

    fn request(prompt: &str) -> DecompositionRequest {
        DecompositionRequest {
            original_prompt: prompt.to_string(),
            target_language: None,
            max_subtasks: 10,
            context: None,
        }
    }

    #[test]
    fn rest_api_request_yields_four_subtasks_with_expected_edges() {
        let result = decomposer().decompose(&request(
            "Implement a REST API for user auth with JWT, include tests",
        ));

        assert_eq!(result.subtasks.len(), 4);
        let task_3 = result.subtasks.iter().find(|t| t.id == "task_3").unwrap();
        assert_eq!(task_3.difficulty, Difficulty::Hard);
        assert_eq!(
            task_3.dependencies,
            vec!["task_1".to_string(), "task_2".to_string()]
        );

        let task_4 = result.subtasks.iter().find(|t| t.id == "task_4").unwrap();
        assert_eq!(task_4.dependencies, vec!["task_3".to_string()]);

        let easy = result
            .subtasks
            .iter()
            .filter(|t| t.difficulty == Difficulty::Easy)
            .count();
        assert_eq!(easy, 3);
        assert!(result.external_dependencies.contains(&"jsonwebtoken".to_string()));
    }

    #[test]
    fn total_loc_is_the_sum_of_subtasks() {
        let result = decomposer().decompose(&request("Build a REST api for orders"));
        let sum: u32 = result.subtasks.iter().map(|t| t.estimated_loc).sum();
        assert_eq!(result.total_estimated_loc, sum);
    }

    #[test]
    fn language_detection_prefers_explicit_mention() {
        let result = decomposer().decompose(&request("Write a python script to parse csv files"));
        assert!(result.subtasks.iter().all(|t| t.language == "python"));
    }

    #[test]
    fn valid_decomposition_passes_validation() {
        let d = decomposer();
        let result = d.decompose(&request("Create a REST api"));
        let report = d.validate(&result);
        assert!(report.ok, "issues: {:?}", report.issues);
    }

    #[test]
    fn validation_rejects_unknown_dependency() {
        let d = decomposer();
        let mut result = d.decompose(&request("Create a REST api"));
        result.subtasks[0].dependencies.push("task_99".to_string());

        let report = d.validate(&result);
        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i.contains("task_99")));
    }

    #[test]
    fn validation_rejects_cycles() {
        let d = decomposer();
        let mut result = d.decompose(&request("Create a REST api"));
        // task_1 -> task_4 closes a cycle with task_4 -> task_3 -> task_1
        result.subtasks[0].dependencies.push("task_4".to_string());

        let report = d.validate(&result);
        assert!(!report.ok);
        assert!(report.issues.iter().any(|i| i.contains("cycle")));
    }

    #[test]
    fn validation_rejects_over_budget() {
        let d = TaskDecomposer::new(CollaborationConfig {
            max_subtasks: 2,
            ..Default::default()
        });
        let generous = decomposer().decompose(&request("Create a REST api"));
        let report = d.validate(&generous);
        assert!(!report.ok);
    }

    #[test]
    fn oversized_template_degrades_to_single_task() {
        let d = TaskDecomposer::new(CollaborationConfig {
            max_subtasks: 2,
            ..Default::default()
        });
        let result = d.decompose(&request("Create a REST api"));
        assert_eq!(result.subtasks.len(), 1);
        assert!(d.validate(&result).ok);
    }

    #[test]
    fn validation_rejects_empty() {
        let d = decomposer();
        let report = d.validate(&DecompositionResult {
            subtasks: vec![],
            total_estimated_loc: 0,
            suggested_approach: String::new(),
            external_dependencies: vec![],
        });
        assert!(!report.ok);
    }
}
