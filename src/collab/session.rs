//! Collaborative coding session state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Difficulty label controlling which tier executes a subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Hard,
}

/// Lifecycle of a single subtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    Pending,
    InProgress,
    Review,
    Done,
    Retry,
    Failed,
}

/// Generated output for a completed subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskResult {
    pub code: String,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One unit of work in a decomposed coding request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Stable id within the decomposition ("task_1", "task_2", ...)
    pub id: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub status: SubtaskStatus,
    pub retry_count: u32,
    pub estimated_loc: u32,
    pub language: String,
    /// Sibling ids that must complete before this subtask starts
    pub dependencies: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SubtaskResult>,
    /// Gate comments carried into the next attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Subtask {
    /// Build a pending subtask.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        difficulty: Difficulty,
        estimated_loc: u32,
        language: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            difficulty,
            status: SubtaskStatus::Pending,
            retry_count: 0,
            estimated_loc,
            language: language.into(),
            dependencies,
            result: None,
            feedback: None,
        }
    }
}

/// Inputs to the task decomposer.
#[derive(Debug, Clone)]
pub struct DecompositionRequest {
    pub original_prompt: String,
    pub target_language: Option<String>,
    pub max_subtasks: usize,
    pub context: Option<String>,
}

/// Output contract of the task decomposer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecompositionResult {
    pub subtasks: Vec<Subtask>,
    pub total_estimated_loc: u32,
    pub suggested_approach: String,
    /// Platform-level packages and frameworks the solution will lean on
    pub external_dependencies: Vec<String>,
}

/// Aggregate progress counters for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub total: usize,
}

/// Aggregate execution metrics for a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub total_time_ms: u64,
    pub low_tier_usage_count: u32,
    pub high_tier_usage_count: u32,
    pub total_cost: f64,
    pub quality_score: f64,
}

/// Session lifecycle; transitions strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodingStatus {
    Planning,
    Executing,
    Reviewing,
    Completed,
    Failed,
}

/// A collaborative coding session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodingSession {
    pub id: String,
    pub original_request: String,
    pub decomposition: DecompositionResult,
    pub subtasks: Vec<Subtask>,
    pub progress: Progress,
    pub metrics: SessionMetrics,
    pub status: CodingStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Why the session failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl CodingSession {
    /// Start a session in the planning phase.
    pub fn new(original_request: impl Into<String>, decomposition: DecompositionResult) -> Self {
        let subtasks = decomposition.subtasks.clone();
        let total = subtasks.len();
        Self {
            id: Uuid::new_v4().to_string(),
            original_request: original_request.into(),
            decomposition,
            subtasks,
            progress: Progress {
                total,
                ..Progress::default()
            },
            metrics: SessionMetrics::default(),
            status: CodingStatus::Planning,
            started_at: Utc::now(),
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Recompute progress counters from subtask statuses.
    pub fn refresh_progress(&mut self) {
        self.progress = Progress {
            completed: self
                .subtasks
                .iter()
                .filter(|t| t.status == SubtaskStatus::Done)
                .count(),
            in_progress: self
                .subtasks
                .iter()
                .filter(|t| {
                    matches!(
                        t.status,
                        SubtaskStatus::InProgress | SubtaskStatus::Review | SubtaskStatus::Retry
                    )
                })
                .count(),
            failed: self
                .subtasks
                .iter()
                .filter(|t| t.status == SubtaskStatus::Failed)
                .count(),
            total: self.subtasks.len(),
        };
    }

    /// Terminate the session as failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = CodingStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decomposition(count: usize) -> DecompositionResult {
        let subtasks: Vec<Subtask> = (1..=count)
            .map(|k| {
                Subtask::new(
                    format!("task_{}", k),
                    format!("step {}", k),
                    Difficulty::Easy,
                    20,
                    "python",
                    vec![],
                )
            })
            .collect();
        DecompositionResult {
            total_estimated_loc: subtasks.iter().map(|t| t.estimated_loc).sum(),
            subtasks,
            suggested_approach: "incremental".to_string(),
            external_dependencies: vec![],
        }
    }

    #[test]
    fn new_session_counts_total() {
        let session = CodingSession::new("build it", decomposition(3));
        assert_eq!(session.progress.total, 3);
        assert_eq!(session.status, CodingStatus::Planning);
        assert_eq!(session.progress.completed, 0);
    }

    #[test]
    fn progress_counters_stay_within_total() {
        let mut session = CodingSession::new("build it", decomposition(3));
        session.subtasks[0].status = SubtaskStatus::Done;
        session.subtasks[1].status = SubtaskStatus::InProgress;
        session.refresh_progress();

        assert_eq!(session.progress.completed, 1);
        assert_eq!(session.progress.in_progress, 1);
        assert_eq!(session.progress.failed, 0);
        assert!(
            session.progress.completed + session.progress.in_progress + session.progress.failed
                <= session.progress.total
        );
    }

    #[test]
    fn fail_records_reason_and_timestamp() {
        let mut session = CodingSession::new("build it", decomposition(1));
        session.fail("decomposition invalid");
        assert_eq!(session.status, CodingStatus::Failed);
        assert_eq!(session.failure_reason.as_deref(), Some("decomposition invalid"));
        assert!(session.completed_at.is_some());
    }
}
