//! Collaborative coding pipeline.
//!
//! Drives a coding session end to end: decompose the request, classify
//! subtask difficulty, execute in dependency order across heterogeneous
//! tiers, gate each result, retry or escalate, and integrate.

pub mod decompose;
pub mod difficulty;
pub mod gate;
pub mod session;

pub use decompose::{TaskDecomposer, ValidationReport};
pub use difficulty::{DifficultyClassifier, SubtaskScorer};
pub use gate::{AnalyzerReview, Issue, IssueCategory, QualityGate, QualityReview, ReviewAnalyzer, Severity};
pub use session::{
    CodingSession, CodingStatus, DecompositionRequest, DecompositionResult, Difficulty, Progress,
    SessionMetrics, Subtask, SubtaskResult, SubtaskStatus,
};

use crate::analyzer::QueryAnalysis;
use crate::api::Request;
use crate::config::CollaborationConfig;
use crate::orchestrator::ModelExecutor;
use crate::registry::{Model, ProviderRegistry};
use crate::routing::TaskType;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Decide whether a request should take the collaborative path.
///
/// A user-specified coding task always does. Otherwise, analytical prompts
/// stay single-model, and coding keywords, fenced code blocks, or a long
/// coding-flavored prompt opt in.
pub fn should_use_collaborative(request: &Request, analysis: &QueryAnalysis) -> bool {
    if request.task_type == Some(TaskType::Coding) {
        return true;
    }

    let lower = request.prompt.to_lowercase();

    let analytical = ["analyze", "analyse", "explain", "compare", "why "]
        .iter()
        .any(|cue| lower.contains(cue));
    if analytical {
        return false;
    }

    let coding_keywords = ["implement", "function", "class ", "refactor", "write code", "build a"]
        .iter()
        .any(|cue| lower.contains(cue));
    let has_code_block = request.prompt.contains("```");
    let long_coding_prompt =
        request.prompt.chars().count() > 400 && analysis.required_capabilities.contains("coding");

    coding_keywords || has_code_block || long_coding_prompt
}

/// Per-subtask execution deltas merged into the session metrics.
#[derive(Debug, Default, Clone, Copy)]
struct ExecutionDeltas {
    cost: f64,
    low_tier_calls: u32,
    high_tier_calls: u32,
}

/// The collaborative orchestrator.
pub struct CollaborativeOrchestrator {
    registry: Arc<ProviderRegistry>,
    decomposer: TaskDecomposer,
    classifier: DifficultyClassifier,
    gate: QualityGate,
    config: CollaborationConfig,
}

impl CollaborativeOrchestrator {
    /// Create the pipeline over a registry with the given knobs.
    pub fn new(registry: Arc<ProviderRegistry>, config: CollaborationConfig) -> Self {
        Self {
            registry,
            decomposer: TaskDecomposer::new(config.clone()),
            classifier: DifficultyClassifier::new(config.clone()),
            gate: QualityGate::new(config.clone()),
            config,
        }
    }

    /// Attach a delegated difficulty scorer.
    pub fn with_scorer(mut self, scorer: Arc<dyn SubtaskScorer>) -> Self {
        self.classifier = self.classifier.with_scorer(scorer);
        self
    }

    /// Attach a delegated review analyzer.
    pub fn with_review_analyzer(mut self, analyzer: Arc<dyn ReviewAnalyzer>) -> Self {
        self.gate = self.gate.with_analyzer(analyzer);
        self
    }

    /// The difficulty classifier (threshold tuning, outcome feedback).
    pub fn classifier(&self) -> &DifficultyClassifier {
        &self.classifier
    }

    /// Run a full coding session for the request.
    pub async fn run(
        &self,
        executor: &dyn ModelExecutor,
        request: &Request,
        session_id: &str,
    ) -> CodingSession {
        let started = Instant::now();

        let decomposition = self.decomposer.decompose(&DecompositionRequest {
            original_prompt: request.prompt.clone(),
            target_language: None,
            max_subtasks: self.config.max_subtasks,
            context: None,
        });

        let mut session = CodingSession::new(request.prompt.clone(), decomposition);

        let report = self.decomposer.validate(&session.decomposition);
        if !report.ok {
            tracing::warn!(issues = ?report.issues, "decomposition rejected");
            session.fail(report.issues.join("; "));
            return session;
        }

        for warning in self.classifier.classify_batch(&mut session.subtasks).await {
            tracing::warn!(%warning, "difficulty distribution");
        }

        let layers = match topo_layers(&session.subtasks) {
            Some(layers) => layers,
            None => {
                session.fail("dependency graph contains a cycle");
                return session;
            }
        };

        session.status = CodingStatus::Executing;
        tracing::info!(
            session = %session.id,
            subtasks = session.subtasks.len(),
            layers = layers.len(),
            "collaborative session executing"
        );

        for layer in layers {
            self.execute_layer(executor, request, &mut session, &layer, session_id)
                .await;
            session.refresh_progress();
        }

        session.status = CodingStatus::Reviewing;
        self.final_quality_check(&mut session).await;

        session.metrics.total_time_ms = started.elapsed().as_millis() as u64;
        session.refresh_progress();
        session.completed_at = Some(chrono::Utc::now());
        session.status = if session.progress.failed == 0 {
            CodingStatus::Completed
        } else {
            session.failure_reason = Some(format!(
                "{} of {} subtasks failed",
                session.progress.failed, session.progress.total
            ));
            CodingStatus::Failed
        };

        tracing::info!(
            session = %session.id,
            status = ?session.status,
            completed = session.progress.completed,
            failed = session.progress.failed,
            cost = session.metrics.total_cost,
            quality = session.metrics.quality_score,
            "collaborative session finished"
        );

        session
    }

    /// Execute one topological layer. Easy subtasks in the layer run
    /// concurrently when parallelism is enabled; hard ones run one at a time.
    async fn execute_layer(
        &self,
        executor: &dyn ModelExecutor,
        request: &Request,
        session: &mut CodingSession,
        layer: &[usize],
        session_id: &str,
    ) {
        let mut sequential: Vec<usize> = Vec::new();
        let mut parallel: Vec<usize> = Vec::new();
        for &index in layer {
            if self.config.parallel_enabled
                && session.subtasks[index].difficulty == Difficulty::Easy
            {
                parallel.push(index);
            } else {
                sequential.push(index);
            }
        }

        if !parallel.is_empty() {
            let jobs = parallel.iter().map(|&index| {
                let subtask = session.subtasks[index].clone();
                let blocked = self.blocked_by_failed_dependency(session, &subtask);
                async move {
                    if blocked {
                        (index, fail_for_dependency(subtask), ExecutionDeltas::default())
                    } else {
                        let (task, deltas) = self
                            .execute_subtask(executor, request, subtask, session_id)
                            .await;
                        (index, task, deltas)
                    }
                }
            });
            for (index, task, deltas) in futures::future::join_all(jobs).await {
                session.subtasks[index] = task;
                merge_deltas(&mut session.metrics, deltas);
            }
        }

        for index in sequential {
            let subtask = session.subtasks[index].clone();
            if self.blocked_by_failed_dependency(session, &subtask) {
                session.subtasks[index] = fail_for_dependency(subtask);
                continue;
            }
            let (task, deltas) = self
                .execute_subtask(executor, request, subtask, session_id)
                .await;
            session.subtasks[index] = task;
            merge_deltas(&mut session.metrics, deltas);
        }
    }

    fn blocked_by_failed_dependency(&self, session: &CodingSession, subtask: &Subtask) -> bool {
        subtask.dependencies.iter().any(|dep| {
            session
                .subtasks
                .iter()
                .find(|t| &t.id == dep)
                .map(|t| t.status != SubtaskStatus::Done)
                .unwrap_or(true)
        })
    }

    /// Execute one subtask to a terminal status, retrying and escalating
    /// per configuration.
    async fn execute_subtask(
        &self,
        executor: &dyn ModelExecutor,
        request: &Request,
        mut subtask: Subtask,
        session_id: &str,
    ) -> (Subtask, ExecutionDeltas) {
        let mut deltas = ExecutionDeltas::default();
        subtask.status = SubtaskStatus::InProgress;

        loop {
            let model = match self.route_for(subtask.difficulty) {
                Some(model) => model,
                None => {
                    subtask.status = SubtaskStatus::Failed;
                    subtask.feedback = Some("no healthy model available".to_string());
                    return (subtask, deltas);
                }
            };

            let prompt = build_subtask_prompt(request, &subtask);
            let response = executor.execute(&model, &prompt, session_id).await;

            deltas.cost += response.cost.total_cost;
            if model.tier < 2 {
                deltas.low_tier_calls += 1;
            } else {
                deltas.high_tier_calls += 1;
            }

            if !response.success {
                let error = response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "provider call failed".to_string());

                if subtask.retry_count >= self.config.max_retries {
                    subtask.status = SubtaskStatus::Failed;
                    subtask.feedback = Some(error);
                    self.classifier.record_outcome(&subtask.description, false);
                    return (subtask, deltas);
                }

                subtask.retry_count += 1;
                if subtask.retry_count >= self.config.auto_escalate_after_retries
                    && subtask.difficulty == Difficulty::Easy
                {
                    tracing::info!(
                        subtask = %subtask.id,
                        retries = subtask.retry_count,
                        "escalating subtask to hard after adapter errors"
                    );
                    subtask.difficulty = Difficulty::Hard;
                }

                subtask.status = SubtaskStatus::Retry;
                continue;
            }

            let (code, explanation) = split_code_block(&response.text);

            subtask.status = SubtaskStatus::Review;
            let review = self.gate.review(&subtask, &code).await;

            if review.requires_revision && subtask.retry_count < self.config.max_retries {
                subtask.retry_count += 1;
                subtask.status = SubtaskStatus::Retry;
                subtask.feedback = Some(render_feedback(&review));
                tracing::debug!(
                    subtask = %subtask.id,
                    score = review.score,
                    retry = subtask.retry_count,
                    "gate requested revision"
                );
                continue;
            }

            if review.passed || !review.requires_revision {
                subtask.status = SubtaskStatus::Done;
                subtask.result = Some(SubtaskResult {
                    code,
                    explanation,
                    metadata: HashMap::from([(
                        "model".to_string(),
                        serde_json::Value::String(model.id.clone()),
                    )]),
                });
                self.classifier.record_outcome(&subtask.description, true);
            } else {
                subtask.status = SubtaskStatus::Failed;
                subtask.feedback = Some(render_feedback(&review));
                self.classifier.record_outcome(&subtask.description, false);
            }
            return (subtask, deltas);
        }
    }

    /// Route a subtask by difficulty: easy work goes to the cheapest
    /// coding-capable tier, hard work to the best higher tier.
    fn route_for(&self, difficulty: Difficulty) -> Option<Model> {
        match difficulty {
            Difficulty::Easy => self
                .registry
                .lowest_tier_with_capability("coding")
                .or_else(|| self.registry.best_at_or_above(0)),
            Difficulty::Hard => self
                .registry
                .best_at_or_above(2)
                .or_else(|| self.registry.best_at_or_above(0)),
        }
    }

    /// Re-review every completed subtask and fold the mean into the
    /// session's quality score.
    async fn final_quality_check(&self, session: &mut CodingSession) {
        let mut scores = Vec::new();
        for subtask in &session.subtasks {
            if subtask.status != SubtaskStatus::Done {
                continue;
            }
            if let Some(result) = &subtask.result {
                let review = self.gate.review(subtask, &result.code).await;
                scores.push(review.score);
            }
        }

        if !scores.is_empty() {
            session.metrics.quality_score = scores.iter().sum::<f64>() / scores.len() as f64;
        }
    }
}

fn merge_deltas(metrics: &mut SessionMetrics, deltas: ExecutionDeltas) {
    metrics.total_cost += deltas.cost;
    metrics.low_tier_usage_count += deltas.low_tier_calls;
    metrics.high_tier_usage_count += deltas.high_tier_calls;
}

fn fail_for_dependency(mut subtask: Subtask) -> Subtask {
    subtask.status = SubtaskStatus::Failed;
    subtask.feedback = Some("a dependency did not complete".to_string());
    subtask
}

/// Layered topological order (Kahn). None when the graph has a cycle.
fn topo_layers(subtasks: &[Subtask]) -> Option<Vec<Vec<usize>>> {
    let id_to_index: HashMap<&str, usize> = subtasks
        .iter()
        .enumerate()
        .map(|(i, t)| (t.id.as_str(), i))
        .collect();

    let mut indegree: Vec<usize> = subtasks
        .iter()
        .map(|t| {
            t.dependencies
                .iter()
                .filter(|d| id_to_index.contains_key(d.as_str()))
                .count()
        })
        .collect();

    let mut placed: HashSet<usize> = HashSet::new();
    let mut layers: Vec<Vec<usize>> = Vec::new();

    while placed.len() < subtasks.len() {
        let layer: Vec<usize> = (0..subtasks.len())
            .filter(|i| !placed.contains(i) && indegree[*i] == 0)
            .collect();
        if layer.is_empty() {
            return None;
        }

        for &done in &layer {
            placed.insert(done);
            let done_id = subtasks[done].id.as_str();
            for (i, task) in subtasks.iter().enumerate() {
                if !placed.contains(&i) && task.dependencies.iter().any(|d| d == done_id) {
                    indegree[i] -= 1;
                }
            }
        }
        layers.push(layer);
    }

    Some(layers)
}

fn build_subtask_prompt(request: &Request, subtask: &Subtask) -> String {
    let mut prompt = format!(
        "You are implementing one subtask of a larger coding request.\n\n\
         Overall request:\n{}\n\n\
         Subtask: {}\n\
         Target language: {}\n\n\
         Return the implementation in a fenced code block, followed by a \
         short explanation.",
        request.prompt, subtask.description, subtask.language
    );

    if let Some(feedback) = &subtask.feedback {
        prompt.push_str(&format!(
            "\n\nA previous attempt was rejected in review; address every \
             comment below:\n{}",
            feedback
        ));
    }

    prompt
}

/// Split a response into (code, explanation) on the first fenced block.
fn split_code_block(text: &str) -> (String, String) {
    if let Some(open) = text.find("```") {
        let after_fence = &text[open + 3..];
        // Skip the language tag line
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        if let Some(close) = body.find("```") {
            let code = body[..close].trim().to_string();
            let explanation = format!(
                "{}{}",
                text[..open].trim(),
                body[close + 3..].trim()
            );
            return (code, explanation);
        }
    }
    (text.trim().to_string(), String::new())
}

fn render_feedback(review: &QualityReview) -> String {
    review
        .issues
        .iter()
        .map(|issue| {
            format!(
                "[{:?}/{:?}] {}{}",
                issue.severity,
                issue.category,
                issue.description,
                issue
                    .suggestion
                    .as_deref()
                    .map(|s| format!(" ({})", s))
                    .unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::QueryAnalyzer;
    use crate::config::AnalyzerConfig;

    fn subtask(id: &str, deps: &[&str]) -> Subtask {
        Subtask::new(
            id,
            format!("do {}", id),
            Difficulty::Easy,
            20,
            "python",
            deps.iter().map(|d| (*d).to_string()).collect(),
        )
    }

    #[test]
    fn topo_layers_respect_dependencies() {
        let tasks = vec![
            subtask("task_1", &[]),
            subtask("task_2", &[]),
            subtask("task_3", &["task_1", "task_2"]),
            subtask("task_4", &["task_3"]),
        ];
        let layers = topo_layers(&tasks).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0], vec![0, 1]);
        assert_eq!(layers[1], vec![2]);
        assert_eq!(layers[2], vec![3]);
    }

    #[test]
    fn topo_layers_detect_cycle() {
        let tasks = vec![subtask("task_1", &["task_2"]), subtask("task_2", &["task_1"])];
        assert!(topo_layers(&tasks).is_none());
    }

    #[test]
    fn split_code_block_extracts_fenced_body() {
        let text = "Here is the code:\n```python\ndef f():\n    return 1\n```\nShort note.";
        let (code, explanation) = split_code_block(text);
        assert_eq!(code, "def f():\n    return 1");
        assert!(explanation.contains("Here is the code:"));
        assert!(explanation.contains("Short note."));
    }

    #[test]
    fn split_code_block_falls_back_to_whole_text() {
        let (code, explanation) = split_code_block("no fences here");
        assert_eq!(code, "no fences here");
        assert!(explanation.is_empty());
    }

    #[test]
    fn collaborative_trigger_rules() {
        let analyzer = QueryAnalyzer::new(AnalyzerConfig::default());

        let coding_request =
            Request::new("please make this faster").with_task_type(TaskType::Coding);
        let analysis = analyzer.analyze(&coding_request.prompt, None);
        assert!(should_use_collaborative(&coding_request, &analysis));

        let analytical = Request::new("Analyze why the deployment failed");
        let analysis = analyzer.analyze(&analytical.prompt, None);
        assert!(!should_use_collaborative(&analytical, &analysis));

        let keyworded = Request::new("Implement a parser for config files");
        let analysis = analyzer.analyze(&keyworded.prompt, None);
        assert!(should_use_collaborative(&keyworded, &analysis));

        let fenced = Request::new("Fix this:\n```js\nlet a = 1\n```");
        let analysis = analyzer.analyze(&fenced.prompt, None);
        assert!(should_use_collaborative(&fenced, &analysis));

        let chatty = Request::new("Tell me about your day");
        let analysis = analyzer.analyze(&chatty.prompt, None);
        assert!(!should_use_collaborative(&chatty, &analysis));
    }
}
