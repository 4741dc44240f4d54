//! Model pricing table.
//!
//! Maps model ids to per-thousand-token prices, minimum charges, and optional
//! free-tier quotas. Many readers, rare writer: rows are replaced atomically
//! so readers always see a consistent snapshot.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by pricing lookups
#[derive(Debug, Error)]
pub enum PricingError {
    /// No pricing row exists for the model
    #[error("No pricing for model '{0}'")]
    UnknownModel(String),
}

/// Provider-allocated monthly quota that bypasses charging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreeTier {
    /// Requests covered per month
    pub requests_per_month: u32,
    /// Tokens covered per month
    pub tokens_per_month: u64,
    /// Day of month the quota resets (1-28)
    pub reset_day: u8,
}

/// Pricing row for a single model. Prices are USD per 1,000 tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_per_1k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_per_1k: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_charge: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_tier: Option<FreeTier>,
    pub last_updated: DateTime<Utc>,
}

impl Pricing {
    /// A row with only input/output prices.
    pub fn per_1k(input: f64, output: f64) -> Self {
        Self {
            input_per_1k: input,
            output_per_1k: output,
            cached_per_1k: None,
            reasoning_per_1k: None,
            minimum_charge: None,
            free_tier: None,
            last_updated: Utc::now(),
        }
    }

    /// Set the cached-token price.
    pub fn with_cached(mut self, per_1k: f64) -> Self {
        self.cached_per_1k = Some(per_1k);
        self
    }

    /// Set the reasoning-token price.
    pub fn with_reasoning(mut self, per_1k: f64) -> Self {
        self.reasoning_per_1k = Some(per_1k);
        self
    }

    /// Set a minimum charge floor.
    pub fn with_minimum_charge(mut self, minimum: f64) -> Self {
        self.minimum_charge = Some(minimum);
        self
    }

    /// Attach a free-tier quota.
    pub fn with_free_tier(mut self, free_tier: FreeTier) -> Self {
        self.free_tier = Some(free_tier);
        self
    }
}

/// Thread-safe pricing table keyed by model id.
pub struct PricingTable {
    rows: DashMap<String, Pricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PricingTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Create a table seeded with the default model catalog.
    pub fn with_defaults() -> Self {
        let table = Self::new();

        // Tier 0 — cheap and fast
        table.set(
            "qwen-flash",
            Pricing::per_1k(0.00005, 0.0002).with_cached(0.00001),
        );
        table.set(
            "gemini-flash-lite",
            Pricing::per_1k(0.000075, 0.0003).with_free_tier(FreeTier {
                requests_per_month: 1_000,
                tokens_per_month: 1_000_000,
                reset_day: 1,
            }),
        );

        // Tier 1 — workhorse
        table.set("gpt-mini", Pricing::per_1k(0.00015, 0.0006));
        table.set("gemini-flash", Pricing::per_1k(0.0003, 0.0025));

        // Tier 2 — strong generalists
        table.set(
            "claude-sonnet",
            Pricing::per_1k(0.003, 0.015).with_cached(0.0003),
        );
        table.set("qwen-max", Pricing::per_1k(0.0016, 0.0064));

        // Tier 3 — frontier
        table.set(
            "claude-opus",
            Pricing::per_1k(0.015, 0.075).with_cached(0.0015),
        );
        table.set(
            "gpt-omni",
            Pricing::per_1k(0.00125, 0.01).with_reasoning(0.01),
        );

        // Tier 4 — multi-model consensus via aggregator
        table.set(
            "consensus-ultra",
            Pricing::per_1k(0.02, 0.08).with_minimum_charge(0.01),
        );

        table
    }

    /// Get the pricing row for a model.
    pub fn get(&self, model_id: &str) -> Option<Pricing> {
        self.rows.get(model_id).map(|entry| entry.value().clone())
    }

    /// Insert or replace a row, stamping `last_updated`.
    pub fn set(&self, model_id: impl Into<String>, mut pricing: Pricing) {
        pricing.last_updated = Utc::now();
        self.rows.insert(model_id.into(), pricing);
    }

    /// Update an existing row.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::UnknownModel` when no row exists yet; use
    /// `set` to create one.
    pub fn update(&self, model_id: &str, pricing: Pricing) -> Result<(), PricingError> {
        if !self.rows.contains_key(model_id) {
            return Err(PricingError::UnknownModel(model_id.to_string()));
        }
        self.set(model_id, pricing);
        Ok(())
    }

    /// All known model ids.
    pub fn model_ids(&self) -> Vec<String> {
        self.rows.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
