//! Supporting types for the provider adapter contract.

use crate::api::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Options for a single generate call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Maximum output tokens the provider may produce
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Outbound call deadline
    pub timeout: Duration,
    /// Free-form metadata forwarded to the adapter
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 4_096,
            temperature: 0.7,
            top_p: 1.0,
            timeout: Duration::from_secs(30),
            metadata: HashMap::new(),
        }
    }
}

impl GenerateOptions {
    /// Options with an explicit deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Options with an explicit output cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Result of a successful generate call.
#[derive(Debug, Clone)]
pub struct GenerateOutput {
    /// Generated text
    pub text: String,
    /// Token usage reported by the provider
    pub token_usage: TokenUsage,
}

/// Lifetime usage totals for an adapter, as reported by `stats()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_tokens: u64,
    pub avg_latency_ms: u32,
}

/// Lock-free counters an adapter can embed to implement `stats()`.
///
/// Average latency uses a cumulative moving average over the request count.
#[derive(Debug, Default)]
pub struct AgentCounters {
    requests: AtomicU64,
    failures: AtomicU64,
    tokens: AtomicU64,
    avg_latency_ms: AtomicU32,
}

impl AgentCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed call.
    pub fn record(&self, success: bool, tokens: u32, latency_ms: u64) {
        let n = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        if !success {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.tokens.fetch_add(u64::from(tokens), Ordering::Relaxed);

        let prev = u64::from(self.avg_latency_ms.load(Ordering::Relaxed));
        let next = (prev * (n - 1) + latency_ms) / n;
        self.avg_latency_ms
            .store(next.min(u64::from(u32::MAX)) as u32, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    pub fn snapshot(&self) -> UsageStats {
        UsageStats {
            total_requests: self.requests.load(Ordering::Relaxed),
            total_failures: self.failures.load(Ordering::Relaxed),
            total_tokens: self.tokens.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms.load(Ordering::Relaxed),
        }
    }
}
