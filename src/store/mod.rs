//! Conversation store and trace sink contracts.
//!
//! The core consumes these interfaces; persistent backends live outside the
//! crate. In-memory implementations are provided as process-local defaults
//! and for tests. Sink failures never block the core path - the memory
//! implementations are infallible, and external implementations are expected
//! to swallow their own errors.

use crate::analyzer::{ConversationContext, PreviousTurn, QueryAnalysis, QueryAnalyzer};
use crate::api::{Request, Response};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

/// Multi-turn conversation state provider.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Build the analyzer context for a conversation, if any turns exist.
    async fn build_context(&self, conversation_id: &str) -> Option<ConversationContext>;

    /// Record a completed turn.
    async fn add_turn(&self, conversation_id: &str, request: &Request, response: &Response);
}

/// One per-request analysis trace record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub request_id: String,
    pub analysis: QueryAnalysis,
    pub task_type: String,
    pub model_selected: String,
    pub recorded_at: DateTime<Utc>,
}

/// Rolling per-model counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub requests: u64,
    pub errors: u64,
    pub cost: f64,
    pub avg_latency_ms: u64,
}

/// Snapshot returned by `real_time_metrics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealTimeMetrics {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_cost: f64,
    pub per_model: BTreeMap<String, ModelMetrics>,
}

/// Observability sink for analysis traces, model metrics, and rollups.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Record a per-request analysis trace.
    async fn log_analysis(&self, record: AnalysisRecord);

    /// Fold one request outcome into a model's rolling counters.
    async fn update_model_metrics(&self, model_id: &str, latency_ms: u64, cost: f64, success: bool);

    /// Record an error event.
    async fn track_error(&self, kind: &str, message: &str, context: HashMap<String, String>);

    /// Fold cost into the daily rollup.
    async fn update_daily_costs(&self, cost: f64);

    /// Current aggregate counters.
    async fn real_time_metrics(&self) -> RealTimeMetrics;
}

/// In-memory conversation store.
///
/// Tags each stored turn with a fresh analysis of its prompt so the derived
/// context carries complexity and domain continuity signals.
pub struct MemoryConversationStore {
    turns: DashMap<String, Vec<PreviousTurn>>,
    analyzer: QueryAnalyzer,
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConversationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            turns: DashMap::new(),
            analyzer: QueryAnalyzer::default(),
        }
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn build_context(&self, conversation_id: &str) -> Option<ConversationContext> {
        self.turns.get(conversation_id).map(|turns| {
            let current_complexity_level = turns
                .iter()
                .map(|t| t.complexity)
                .max()
                .unwrap_or_default();
            ConversationContext {
                previous_turns: turns.clone(),
                turn_count: turns.len() as u32,
                current_complexity_level,
            }
        })
    }

    async fn add_turn(&self, conversation_id: &str, request: &Request, response: &Response) {
        let analysis = self.analyzer.analyze(&request.prompt, None);
        let turn = PreviousTurn {
            complexity: analysis.complexity,
            model_id: response.model_used.clone(),
            success: response.success,
            domains: analysis.domain,
        };
        self.turns
            .entry(conversation_id.to_string())
            .or_default()
            .push(turn);
    }
}

/// In-memory trace sink with aggregate counters.
#[derive(Default)]
pub struct MemoryTraceSink {
    analyses: Mutex<Vec<AnalysisRecord>>,
    models: DashMap<String, ModelMetrics>,
    errors: Mutex<Vec<(String, String)>>,
    daily_costs: DashMap<String, f64>,
}

impl MemoryTraceSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored analysis records (test hook).
    pub fn analyses(&self) -> Vec<AnalysisRecord> {
        self.analyses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded error events (test hook).
    pub fn errors(&self) -> Vec<(String, String)> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Daily cost rollups keyed by date.
    pub fn daily_costs(&self) -> BTreeMap<String, f64> {
        self.daily_costs
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn log_analysis(&self, record: AnalysisRecord) {
        self.analyses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    async fn update_model_metrics(
        &self,
        model_id: &str,
        latency_ms: u64,
        cost: f64,
        success: bool,
    ) {
        let mut entry = self.models.entry(model_id.to_string()).or_default();
        let n = entry.requests;
        entry.avg_latency_ms = (entry.avg_latency_ms * n + latency_ms) / (n + 1);
        entry.requests += 1;
        entry.cost += cost;
        if !success {
            entry.errors += 1;
        }
    }

    async fn track_error(&self, kind: &str, message: &str, _context: HashMap<String, String>) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((kind.to_string(), message.to_string()));
    }

    async fn update_daily_costs(&self, cost: f64) {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        *self.daily_costs.entry(day).or_insert(0.0) += cost;
    }

    async fn real_time_metrics(&self) -> RealTimeMetrics {
        let per_model: BTreeMap<String, ModelMetrics> = self
            .models
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        RealTimeMetrics {
            total_requests: per_model.values().map(|m| m.requests).sum(),
            total_errors: per_model.values().map(|m| m.errors).sum(),
            total_cost: per_model.values().map(|m| m.cost).sum(),
            per_model,
        }
    }
}
