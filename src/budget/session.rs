//! Per-session usage tracking.
//!
//! Sessions are keyed by id; operations on a given key are serialized by the
//! map's entry locks, so a session is a serial stream of updates.

use crate::api::TokenUsage;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Lifecycle state of a usage session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Aborted,
}

/// Per-model accumulators within a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelBreakdown {
    pub requests: u64,
    pub tokens: u64,
    pub cost: f64,
    pub avg_latency_ms: u32,
    pub errors: u64,
}

/// Running totals for one caller session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSession {
    pub id: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub model_breakdown: BTreeMap<String, ModelBreakdown>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl UsageSession {
    fn new(id: &str, user_metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            id: id.to_string(),
            status: SessionStatus::Active,
            started_at: Utc::now(),
            completed_at: None,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            total_tokens: 0,
            total_cost: 0.0,
            model_breakdown: BTreeMap::new(),
            user_metadata,
        }
    }

    fn record(
        &mut self,
        model_id: &str,
        usage: &TokenUsage,
        cost: f64,
        latency_ms: u64,
        success: bool,
    ) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.total_tokens += u64::from(usage.total);
        self.total_cost += cost;

        let entry = self.model_breakdown.entry(model_id.to_string()).or_default();
        let n = entry.requests;
        entry.avg_latency_ms =
            ((u64::from(entry.avg_latency_ms) * n + latency_ms) / (n + 1)).min(u64::from(u32::MAX))
                as u32;
        entry.requests += 1;
        entry.tokens += u64::from(usage.total);
        entry.cost += cost;
        if !success {
            entry.errors += 1;
        }
    }
}

/// Session map with per-key serialized updates.
#[derive(Default)]
pub struct UsageTracker {
    sessions: DashMap<String, UsageSession>,
}

impl UsageTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the session on first use, keeping an existing one untouched.
    pub fn open(&self, session_id: &str, user_metadata: HashMap<String, serde_json::Value>) {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| UsageSession::new(session_id, user_metadata));
    }

    /// Record one completed request into the session.
    pub fn record(
        &self,
        session_id: &str,
        model_id: &str,
        usage: &TokenUsage,
        cost: f64,
        latency_ms: u64,
        success: bool,
    ) {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| UsageSession::new(session_id, HashMap::new()));
        entry.record(model_id, usage, cost, latency_ms, success);
    }

    /// Accumulated cost for a session (0.0 when unknown).
    pub fn session_cost(&self, session_id: &str) -> f64 {
        self.sessions
            .get(session_id)
            .map(|entry| entry.total_cost)
            .unwrap_or(0.0)
    }

    /// Close a session with a terminal status.
    pub fn close(&self, session_id: &str, status: SessionStatus) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.status = status;
            entry.completed_at = Some(Utc::now());
        }
    }

    /// Snapshot a session by id.
    pub fn get(&self, session_id: &str) -> Option<UsageSession> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    /// Number of tracked sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_counts_partition() {
        let tracker = UsageTracker::new();
        tracker.record("s1", "m1", &TokenUsage::new(100, 50), 0.01, 120, true);
        tracker.record("s1", "m1", &TokenUsage::new(80, 40), 0.01, 80, false);
        tracker.record("s1", "m2", &TokenUsage::new(10, 5), 0.001, 40, true);

        let session = tracker.get("s1").unwrap();
        assert_eq!(session.total_requests, 3);
        assert_eq!(
            session.total_requests,
            session.successful_requests + session.failed_requests
        );
        assert_eq!(session.failed_requests, 1);
    }

    #[test]
    fn total_tokens_equal_breakdown_sum() {
        let tracker = UsageTracker::new();
        tracker.record("s1", "m1", &TokenUsage::new(100, 50), 0.01, 10, true);
        tracker.record("s1", "m2", &TokenUsage::new(200, 100), 0.02, 10, true);

        let session = tracker.get("s1").unwrap();
        let breakdown_total: u64 = session.model_breakdown.values().map(|b| b.tokens).sum();
        assert_eq!(session.total_tokens, breakdown_total);
        assert_eq!(session.total_tokens, 450);
    }

    #[test]
    fn model_errors_counted() {
        let tracker = UsageTracker::new();
        tracker.record("s1", "m1", &TokenUsage::zero(), 0.0, 10, false);

        let session = tracker.get("s1").unwrap();
        assert_eq!(session.model_breakdown["m1"].errors, 1);
    }

    #[test]
    fn close_sets_terminal_state() {
        let tracker = UsageTracker::new();
        tracker.open("s1", HashMap::new());
        tracker.close("s1", SessionStatus::Completed);

        let session = tracker.get("s1").unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.completed_at.is_some());
    }

    #[test]
    fn open_is_idempotent() {
        let tracker = UsageTracker::new();
        tracker.open("s1", HashMap::new());
        tracker.record("s1", "m1", &TokenUsage::new(1, 1), 0.0, 1, true);
        tracker.open("s1", HashMap::new());

        assert_eq!(tracker.get("s1").unwrap().total_requests, 1);
    }

    #[test]
    fn latency_moving_average() {
        let tracker = UsageTracker::new();
        tracker.record("s1", "m1", &TokenUsage::new(1, 1), 0.0, 100, true);
        tracker.record("s1", "m1", &TokenUsage::new(1, 1), 0.0, 200, true);

        let session = tracker.get("s1").unwrap();
        assert_eq!(session.model_breakdown["m1"].avg_latency_ms, 150);
    }
}
