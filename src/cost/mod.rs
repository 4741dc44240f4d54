//! Cost calculator.
//!
//! Pure function from (model, token usage) to a cost breakdown, backed by the
//! pricing table. Given identical inputs and the same pricing row, the result
//! is bit-identical.

use crate::api::TokenUsage;
use crate::pricing::{PricingError, PricingTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Cost of a single request, broken down by token bucket.
///
/// `total_cost` is at least the sum of the sub-costs, and at least the
/// pricing row's minimum charge when one is defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_cost: Option<f64>,
    pub total_cost: f64,
    pub currency: String,
    pub calculated_at: DateTime<Utc>,
}

impl CostBreakdown {
    /// Zero cost, reported on failed or denied requests.
    pub fn zero() -> Self {
        Self {
            input_cost: 0.0,
            output_cost: 0.0,
            cached_cost: None,
            reasoning_cost: None,
            total_cost: 0.0,
            currency: "USD".to_string(),
            calculated_at: Utc::now(),
        }
    }

    /// Sum of the per-bucket sub-costs (excludes any minimum-charge floor).
    pub fn bucket_sum(&self) -> f64 {
        self.input_cost
            + self.output_cost
            + self.cached_cost.unwrap_or(0.0)
            + self.reasoning_cost.unwrap_or(0.0)
    }

    /// Combine two breakdowns (e.g., base call plus cascade or refinement).
    pub fn accumulate(&self, other: &CostBreakdown) -> CostBreakdown {
        CostBreakdown {
            input_cost: self.input_cost + other.input_cost,
            output_cost: self.output_cost + other.output_cost,
            cached_cost: match (self.cached_cost, other.cached_cost) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
            },
            reasoning_cost: match (self.reasoning_cost, other.reasoning_cost) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
            },
            total_cost: self.total_cost + other.total_cost,
            currency: self.currency.clone(),
            calculated_at: Utc::now(),
        }
    }
}

/// Computes cost breakdowns from token usage and the pricing table.
#[derive(Clone)]
pub struct CostCalculator {
    table: Arc<PricingTable>,
}

impl CostCalculator {
    /// Create a calculator over a shared pricing table.
    pub fn new(table: Arc<PricingTable>) -> Self {
        Self { table }
    }

    /// The pricing table backing this calculator.
    pub fn table(&self) -> &Arc<PricingTable> {
        &self.table
    }

    /// Compute the cost breakdown for a request.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::UnknownModel` if no pricing row exists.
    pub fn calculate(
        &self,
        model_id: &str,
        usage: &TokenUsage,
    ) -> Result<CostBreakdown, PricingError> {
        let pricing = self
            .table
            .get(model_id)
            .ok_or_else(|| PricingError::UnknownModel(model_id.to_string()))?;

        let input_cost = f64::from(usage.input) / 1_000.0 * pricing.input_per_1k;
        let output_cost = f64::from(usage.output) / 1_000.0 * pricing.output_per_1k;

        let cached_cost = match (usage.cached, pricing.cached_per_1k) {
            (Some(tokens), Some(per_1k)) => Some(f64::from(tokens) / 1_000.0 * per_1k),
            _ => None,
        };
        let reasoning_cost = match (usage.reasoning, pricing.reasoning_per_1k) {
            (Some(tokens), Some(per_1k)) => Some(f64::from(tokens) / 1_000.0 * per_1k),
            _ => None,
        };

        let bucket_sum = input_cost
            + output_cost
            + cached_cost.unwrap_or(0.0)
            + reasoning_cost.unwrap_or(0.0);

        let total_cost = match pricing.minimum_charge {
            Some(minimum) if bucket_sum < minimum => minimum,
            _ => bucket_sum,
        };

        Ok(CostBreakdown {
            input_cost,
            output_cost,
            cached_cost,
            reasoning_cost,
            total_cost,
            currency: "USD".to_string(),
            calculated_at: Utc::now(),
        })
    }

    /// Compute breakdowns for several models over the same usage.
    ///
    /// # Errors
    ///
    /// Returns `PricingError::UnknownModel` for the first id without pricing.
    pub fn compare(
        &self,
        model_ids: &[&str],
        usage: &TokenUsage,
    ) -> Result<BTreeMap<String, CostBreakdown>, PricingError> {
        let mut result = BTreeMap::new();
        for id in model_ids {
            result.insert((*id).to_string(), self.calculate(id, usage)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::Pricing;

    fn calculator_with(model: &str, pricing: Pricing) -> CostCalculator {
        let table = Arc::new(PricingTable::new());
        table.set(model, pricing);
        CostCalculator::new(table)
    }

    #[test]
    fn per_thousand_math() {
        let calc = calculator_with("m", Pricing::per_1k(0.003, 0.015));
        let breakdown = calc.calculate("m", &TokenUsage::new(1_000, 2_000)).unwrap();

        assert!((breakdown.input_cost - 0.003).abs() < 1e-12);
        assert!((breakdown.output_cost - 0.030).abs() < 1e-12);
        assert!((breakdown.total_cost - 0.033).abs() < 1e-12);
        assert_eq!(breakdown.currency, "USD");
    }

    #[test]
    fn cached_and_reasoning_buckets_are_priced() {
        let calc = calculator_with(
            "m",
            Pricing::per_1k(0.001, 0.002)
                .with_cached(0.0001)
                .with_reasoning(0.002),
        );
        let usage = TokenUsage::new(1_000, 1_000)
            .with_cached(10_000)
            .with_reasoning(500);
        let breakdown = calc.calculate("m", &usage).unwrap();

        assert!((breakdown.cached_cost.unwrap() - 0.001).abs() < 1e-12);
        assert!((breakdown.reasoning_cost.unwrap() - 0.001).abs() < 1e-12);
        assert!((breakdown.total_cost - breakdown.bucket_sum()).abs() < 1e-12);
    }

    #[test]
    fn zero_tokens_with_minimum_charge_floors_total() {
        let calc = calculator_with("m", Pricing::per_1k(0.01, 0.02).with_minimum_charge(0.05));
        let breakdown = calc.calculate("m", &TokenUsage::zero()).unwrap();

        assert_eq!(breakdown.input_cost, 0.0);
        assert_eq!(breakdown.total_cost, 0.05);
        assert!(breakdown.total_cost >= breakdown.bucket_sum());
    }

    #[test]
    fn minimum_charge_not_applied_above_floor() {
        let calc = calculator_with("m", Pricing::per_1k(0.01, 0.02).with_minimum_charge(0.05));
        let breakdown = calc
            .calculate("m", &TokenUsage::new(100_000, 100_000))
            .unwrap();
        assert!((breakdown.total_cost - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_is_an_error() {
        let calc = CostCalculator::new(Arc::new(PricingTable::new()));
        let result = calc.calculate("ghost", &TokenUsage::new(1, 1));
        assert!(matches!(result, Err(PricingError::UnknownModel(_))));
    }

    #[test]
    fn compare_returns_breakdown_per_model() {
        let table = Arc::new(PricingTable::new());
        table.set("cheap", Pricing::per_1k(0.001, 0.002));
        table.set("dear", Pricing::per_1k(0.01, 0.02));
        let calc = CostCalculator::new(table);

        let usage = TokenUsage::new(1_000, 1_000);
        let map = calc.compare(&["cheap", "dear"], &usage).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map["cheap"].total_cost < map["dear"].total_cost);
    }

    #[test]
    fn compare_fails_on_unknown_id() {
        let calc = calculator_with("known", Pricing::per_1k(0.001, 0.002));
        let result = calc.compare(&["known", "ghost"], &TokenUsage::new(1, 1));
        assert!(result.is_err());
    }

    #[test]
    fn deterministic_for_identical_inputs() {
        let calc = calculator_with("m", Pricing::per_1k(0.0017, 0.0093));
        let usage = TokenUsage::new(12_345, 6_789);
        let a = calc.calculate("m", &usage).unwrap();
        let b = calc.calculate("m", &usage).unwrap();
        assert_eq!(a.input_cost.to_bits(), b.input_cost.to_bits());
        assert_eq!(a.output_cost.to_bits(), b.output_cost.to_bits());
        assert_eq!(a.total_cost.to_bits(), b.total_cost.to_bits());
    }
}
