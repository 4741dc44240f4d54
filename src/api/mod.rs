//! Public request and response shapes for the orchestrator core.
//!
//! These are the types the hosting surface (HTTP, CLI, tests) exchanges with
//! the core. The wire mapping lives outside this crate; the shapes here are
//! the contract.

use crate::cost::CostBreakdown;
use crate::routing::TaskType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum accepted prompt length in characters.
pub const MAX_PROMPT_CHARS: usize = 50_000;

/// An inbound request to the orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Request {
    /// The natural-language prompt (required, at most 50,000 chars).
    pub prompt: String,

    /// Task type override. `None` or `TaskType::Auto` lets the router classify.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,

    /// Restrict candidate models to a single tier (0-4).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_tier: Option<u8>,

    /// Conversation id for multi-turn context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    /// Free-form caller metadata, carried into the usage session.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl Request {
    /// Build a minimal request with just a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            task_type: None,
            preferred_tier: None,
            conversation_id: None,
            user_metadata: HashMap::new(),
        }
    }

    /// Set the task type.
    pub fn with_task_type(mut self, task_type: TaskType) -> Self {
        self.task_type = Some(task_type);
        self
    }

    /// Set the preferred tier.
    pub fn with_preferred_tier(mut self, tier: u8) -> Self {
        self.preferred_tier = Some(tier);
        self
    }

    /// Set the conversation id.
    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }
}

/// Token usage for a single request.
///
/// `total` is authoritative and already includes the optional cached and
/// reasoning buckets, so `total >= input + output` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<u32>,
}

impl TokenUsage {
    /// Usage with only input/output buckets; `total` is derived.
    pub fn new(input: u32, output: u32) -> Self {
        Self {
            input,
            output,
            total: input + output,
            cached: None,
            reasoning: None,
        }
    }

    /// Zero usage, reported on failed or denied requests.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Add a cached-token bucket (counted into `total`).
    pub fn with_cached(mut self, cached: u32) -> Self {
        self.cached = Some(cached);
        self.total += cached;
        self
    }

    /// Add a reasoning-token bucket (counted into `total`).
    pub fn with_reasoning(mut self, reasoning: u32) -> Self {
        self.reasoning = Some(reasoning);
        self.total += reasoning;
        self
    }
}

/// Machine-readable error codes surfaced on failed responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CostLimitExceeded,
    BudgetExceeded,
    ApiKeyMissing,
    InvalidTaskType,
    ModelUnavailable,
    RateLimitExceeded,
    Timeout,
    GenerationError,
    OrchestratorError,
    CapabilityError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::CostLimitExceeded => "COST_LIMIT_EXCEEDED",
            ErrorCode::BudgetExceeded => "BUDGET_EXCEEDED",
            ErrorCode::ApiKeyMissing => "API_KEY_MISSING",
            ErrorCode::InvalidTaskType => "INVALID_TASK_TYPE",
            ErrorCode::ModelUnavailable => "MODEL_UNAVAILABLE",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::GenerationError => "GENERATION_ERROR",
            ErrorCode::OrchestratorError => "ORCHESTRATOR_ERROR",
            ErrorCode::CapabilityError => "CAPABILITY_ERROR",
        };
        f.write_str(s)
    }
}

/// Error detail attached to a failed response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseError {
    pub code: ErrorCode,
    pub message: String,
    /// Underlying provider error, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// The orchestrator's answer to a single request.
///
/// Even on failure the response carries a valid zero-token usage, a zero cost
/// breakdown, and a measured latency so downstream observability is uniform.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Response {
    pub success: bool,
    pub model_used: String,
    pub tier_used: u8,
    pub text: String,
    pub token_usage: TokenUsage,
    pub cost: CostBreakdown,
    pub latency_ms: u64,
    pub fallback_used: bool,
    pub tier_escalated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

impl Response {
    /// Build a failure response with zero usage and cost.
    pub fn failure(code: ErrorCode, message: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            success: false,
            model_used: String::new(),
            tier_used: 0,
            text: String::new(),
            token_usage: TokenUsage::zero(),
            cost: CostBreakdown::zero(),
            latency_ms,
            fallback_used: false,
            tier_escalated: false,
            error: Some(ResponseError {
                code,
                message: message.into(),
                cause: None,
            }),
        }
    }

    /// Attach an underlying provider error string.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.cause = Some(cause.into());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_total_is_derived() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total, 150);
        assert!(usage.total >= usage.input + usage.output);
    }

    #[test]
    fn token_usage_buckets_count_into_total() {
        let usage = TokenUsage::new(100, 50).with_cached(20).with_reasoning(30);
        assert_eq!(usage.cached, Some(20));
        assert_eq!(usage.reasoning, Some(30));
        assert_eq!(usage.total, 200);
        assert!(usage.total >= usage.input + usage.output);
    }

    #[test]
    fn failure_response_has_zero_usage_and_cost() {
        let response = Response::failure(ErrorCode::BudgetExceeded, "monthly budget exhausted", 3);
        assert!(!response.success);
        assert_eq!(response.token_usage, TokenUsage::zero());
        assert_eq!(response.cost.total_cost, 0.0);
        assert_eq!(response.latency_ms, 3);
        assert_eq!(response.error.unwrap().code, ErrorCode::BudgetExceeded);
    }

    #[test]
    fn error_code_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
        let json = serde_json::to_string(&ErrorCode::CostLimitExceeded).unwrap();
        assert_eq!(json, "\"COST_LIMIT_EXCEEDED\"");
    }

    #[test]
    fn error_code_display_matches_serde() {
        assert_eq!(ErrorCode::Timeout.to_string(), "TIMEOUT");
        assert_eq!(ErrorCode::ModelUnavailable.to_string(), "MODEL_UNAVAILABLE");
    }
}
