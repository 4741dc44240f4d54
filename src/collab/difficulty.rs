//! Difficulty classifier.
//!
//! Re-scores each subtask's difficulty from three signals: a size/language
//! heuristic, keyword complexity, and historical category success rates.
//! An optional delegated scorer is blended in. The easy/hard threshold is
//! adjustable at runtime from observed tier performance.

use super::session::{Difficulty, Subtask};
use crate::config::CollaborationConfig;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{PoisonError, RwLock};

/// Delegated semantic scorer (typically an LLM-backed analyzer).
/// Returns a difficulty score in [0, 100], or None when unavailable.
#[async_trait]
pub trait SubtaskScorer: Send + Sync {
    async fn score(&self, subtask: &Subtask) -> Option<f64>;
}

const HARD_CUES: &[&str] = &[
    "algorithm",
    "optimization",
    "security",
    "distributed",
    "concurrency",
    "machine learning",
    "transaction",
    "cache",
    "business logic",
    "api design",
];

const SIMPLE_CUES: &[&str] = &[
    "crud", "form", "validation", "display", "list", "button", "render", "template", "scaffold",
    "styling",
];

/// Seeded category success rates; updated as outcomes arrive.
const SEED_SUCCESS_RATES: &[(&str, f64)] = &[
    ("testing", 0.90),
    ("configuration", 0.85),
    ("ui", 0.80),
    ("general", 0.75),
    ("api", 0.70),
    ("data", 0.65),
    ("algorithm", 0.50),
];

/// Coarse task category used for the historical-success lookup.
fn categorize(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    if lower.contains("test") {
        "testing"
    } else if lower.contains("config") || lower.contains("scaffold") || lower.contains("set up") {
        "configuration"
    } else if lower.contains("styling") || lower.contains("component") || lower.contains("layout") {
        "ui"
    } else if lower.contains("algorithm") || lower.contains("optimiz") {
        "algorithm"
    } else if lower.contains("pars") || lower.contains("transform") || lower.contains("serialize") {
        "data"
    } else if lower.contains("route") || lower.contains("endpoint") || lower.contains("api")
        || lower.contains("business logic")
    {
        "api"
    } else {
        "general"
    }
}

/// The difficulty classifier.
pub struct DifficultyClassifier {
    config: CollaborationConfig,
    success_rates: DashMap<String, f64>,
    threshold: RwLock<f64>,
    scorer: Option<std::sync::Arc<dyn SubtaskScorer>>,
}

impl DifficultyClassifier {
    /// Create a classifier with seeded success rates.
    pub fn new(config: CollaborationConfig) -> Self {
        let success_rates = DashMap::new();
        for (category, rate) in SEED_SUCCESS_RATES {
            success_rates.insert((*category).to_string(), *rate);
        }
        let threshold = RwLock::new(config.difficulty_threshold);
        Self {
            config,
            success_rates,
            threshold,
            scorer: None,
        }
    }

    /// Attach a delegated scorer.
    pub fn with_scorer(mut self, scorer: std::sync::Arc<dyn SubtaskScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// The current easy/hard threshold (0-1).
    pub fn threshold(&self) -> f64 {
        *self
            .threshold
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Size/language heuristic in [0, 100].
    fn heuristic_score(&self, subtask: &Subtask) -> f64 {
        let mut score: f64 = match subtask.estimated_loc {
            0..=30 => 20.0,
            31..=100 => 40.0,
            101..=200 => 60.0,
            _ => 80.0,
        };

        score += match subtask.language.as_str() {
            "html" | "css" | "json" | "markdown" => -10.0,
            "typescript" | "java" | "csharp" => 10.0,
            "rust" | "go" | "cpp" | "c++" => 15.0,
            _ => 0.0,
        };

        score += (subtask.dependencies.len() as f64 * 5.0).min(15.0);
        score.clamp(0.0, 100.0)
    }

    /// Keyword complexity in [0, 100].
    fn complexity_score(&self, subtask: &Subtask) -> f64 {
        let lower = subtask.description.to_lowercase();
        let mut score: f64 = 50.0;

        let hard_hits = HARD_CUES.iter().filter(|cue| lower.contains(*cue)).count();
        score += (hard_hits as f64 * 10.0).min(40.0);

        let simple_hits = SIMPLE_CUES.iter().filter(|cue| lower.contains(*cue)).count();
        score -= (simple_hits as f64 * 10.0).min(30.0);

        score.clamp(0.0, 100.0)
    }

    /// Historical-context score in [0, 100]: low success rates score hard.
    fn context_score(&self, subtask: &Subtask) -> f64 {
        let category = categorize(&subtask.description);
        let rate = self
            .success_rates
            .get(category)
            .map(|r| *r)
            .unwrap_or(0.75);
        (1.0 - rate) * 100.0
    }

    /// Blended score for one subtask, including the delegated scorer.
    async fn final_score(&self, subtask: &Subtask) -> f64 {
        let heuristic = self.heuristic_score(subtask);
        let complexity = self.complexity_score(subtask);
        let context = self.context_score(subtask);
        let own = 0.4 * heuristic + 0.4 * complexity + 0.2 * context;

        match &self.scorer {
            Some(scorer) => match scorer.score(subtask).await {
                Some(delegated) => {
                    let mix = self.config.heuristic_mix;
                    mix * own + (1.0 - mix) * delegated.clamp(0.0, 100.0)
                }
                None => own,
            },
            None => own,
        }
    }

    /// Re-label every subtask and return distribution warnings.
    pub async fn classify_batch(&self, subtasks: &mut [Subtask]) -> Vec<String> {
        let threshold = self.threshold() * 100.0;

        for subtask in subtasks.iter_mut() {
            let score = self.final_score(subtask).await;
            let label = if score < threshold {
                Difficulty::Easy
            } else {
                Difficulty::Hard
            };

            if label != subtask.difficulty {
                tracing::debug!(
                    subtask = %subtask.id,
                    score,
                    threshold,
                    from = ?subtask.difficulty,
                    to = ?label,
                    "difficulty re-labeled"
                );
            }
            subtask.difficulty = label;
        }

        self.distribution_warnings(subtasks)
    }

    fn distribution_warnings(&self, subtasks: &[Subtask]) -> Vec<String> {
        let mut warnings = Vec::new();
        if subtasks.is_empty() {
            return warnings;
        }

        let easy = subtasks
            .iter()
            .filter(|t| t.difficulty == Difficulty::Easy)
            .count();
        let ratio = easy as f64 / subtasks.len() as f64;

        if ratio > 0.9 {
            warnings.push(format!(
                "{:.0}% of subtasks labeled easy; threshold may be too high",
                ratio * 100.0
            ));
        }
        if ratio < 0.1 {
            warnings.push(format!(
                "{:.0}% of subtasks labeled easy; threshold may be too low",
                ratio * 100.0
            ));
        }

        for subtask in subtasks {
            match subtask.difficulty {
                Difficulty::Easy if subtask.estimated_loc > 200 => warnings.push(format!(
                    "subtask '{}' labeled easy despite {} estimated lines",
                    subtask.id, subtask.estimated_loc
                )),
                Difficulty::Hard if subtask.estimated_loc <= 30 => warnings.push(format!(
                    "subtask '{}' labeled hard despite only {} estimated lines",
                    subtask.id, subtask.estimated_loc
                )),
                _ => {}
            }
        }

        warnings
    }

    /// Adjust the threshold from recent tier performance.
    ///
    /// A very reliable low tier earns more work (raise); a struggling low
    /// tier sheds work (lower); an overloaded high tier pushes work back
    /// down (raise).
    pub fn adjust_threshold(&self, low_tier_success_rate: f64, high_tier_utilization: f64) {
        let mut threshold = self
            .threshold
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = *threshold;

        if low_tier_success_rate > 0.9 {
            *threshold += 0.05;
        } else if low_tier_success_rate < 0.7 {
            *threshold -= 0.05;
        }
        if high_tier_utilization > 0.7 {
            *threshold += 0.05;
        }

        *threshold = threshold.clamp(0.1, 0.9);

        if (*threshold - before).abs() > f64::EPSILON {
            tracing::info!(
                from = before,
                to = *threshold,
                low_tier_success_rate,
                high_tier_utilization,
                "difficulty threshold adjusted"
            );
        }
    }

    /// Fold a subtask outcome into the category success rates (EWMA).
    pub fn record_outcome(&self, description: &str, success: bool) {
        let category = categorize(description);
        let observed = if success { 1.0 } else { 0.0 };
        let mut entry = self
            .success_rates
            .entry(category.to_string())
            .or_insert(0.75);
        *entry = 0.8 * *entry + 0.2 * observed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn subtask(description: &str, loc: u32, language: &str, deps: usize) -> Subtask {
        Subtask::new(
            "task_1",
            description,
            Difficulty::Easy,
            loc,
            language,
            (0..deps).map(|i| format!("dep_{}", i)).collect(),
        )
    }

    fn classifier() -> DifficultyClassifier {
        DifficultyClassifier::new(CollaborationConfig::default())
    }

    #[tokio::test]
    async fn tiny_display_task_stays_easy() {
        let mut tasks = vec![subtask("Render the list display template", 20, "html", 0)];
        classifier().classify_batch(&mut tasks).await;
        assert_eq!(tasks[0].difficulty, Difficulty::Easy);
    }

    #[tokio::test]
    async fn large_security_algorithm_goes_hard() {
        let mut tasks = vec![subtask(
            "Implement the distributed security algorithm with optimization",
            250,
            "rust",
            2,
        )];
        classifier().classify_batch(&mut tasks).await;
        assert_eq!(tasks[0].difficulty, Difficulty::Hard);
    }

    #[tokio::test]
    async fn delegated_scorer_shifts_the_blend() {
        struct MaxScorer;
        #[async_trait]
        impl SubtaskScorer for MaxScorer {
            async fn score(&self, _subtask: &Subtask) -> Option<f64> {
                Some(100.0)
            }
        }

        // Borderline task: easy on heuristics alone, hard once a maximal
        // delegated score is blended at 30%.
        let mut tasks = vec![subtask("Implement the api business logic", 90, "python", 1)];
        classifier().classify_batch(&mut tasks).await;
        assert_eq!(tasks[0].difficulty, Difficulty::Easy);

        let delegating = classifier().with_scorer(Arc::new(MaxScorer));
        let mut tasks = vec![subtask("Implement the api business logic", 90, "python", 1)];
        delegating.classify_batch(&mut tasks).await;
        assert_eq!(tasks[0].difficulty, Difficulty::Hard);
    }

    #[tokio::test]
    async fn skewed_distribution_warns() {
        let mut tasks = vec![
            subtask("Render the form", 10, "html", 0),
            subtask("Display the list", 15, "html", 0),
            subtask("Show the button template", 12, "html", 0),
        ];
        let warnings = classifier().classify_batch(&mut tasks).await;
        assert!(warnings.iter().any(|w| w.contains("easy")));
    }

    #[test]
    fn threshold_adjustment_rules() {
        let classifier = classifier();
        let start = classifier.threshold();

        classifier.adjust_threshold(0.95, 0.0);
        assert!(classifier.threshold() > start);

        classifier.adjust_threshold(0.5, 0.0);
        classifier.adjust_threshold(0.5, 0.0);
        assert!(classifier.threshold() < start + 0.05 + f64::EPSILON);

        // Clamped to the configured band.
        for _ in 0..30 {
            classifier.adjust_threshold(0.0, 0.0);
        }
        assert!((classifier.threshold() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn outcomes_move_success_rates() {
        let classifier = classifier();
        let before = classifier.context_score(&subtask("write unit tests", 10, "python", 0));
        for _ in 0..5 {
            classifier.record_outcome("write unit tests", false);
        }
        let after = classifier.context_score(&subtask("write unit tests", 10, "python", 0));
        assert!(after > before);
    }
}
