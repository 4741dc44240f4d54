//! Candidate scoring for model selection.

use crate::analyzer::{Complexity, QueryAnalysis};
use crate::registry::Model;

/// Weights for scoring model candidates. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterWeights {
    /// Weight for complexity-tier fit
    pub complexity_fit: f64,
    /// Weight for capability match
    pub capability: f64,
    /// Weight for priority-balance fit
    pub priority: f64,
    /// Weight for domain specialization bonus
    pub domain: f64,
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self {
            complexity_fit: 0.35,
            capability: 0.25,
            priority: 0.25,
            domain: 0.15,
        }
    }
}

impl RouterWeights {
    /// Validate that weights sum to 1
    pub fn validate(&self) -> Result<(), String> {
        let sum = self.complexity_fit + self.capability + self.priority + self.domain;
        if (sum - 1.0).abs() > 1e-9 {
            Err(format!("Router weights must sum to 1.0, got {}", sum))
        } else {
            Ok(())
        }
    }
}

/// Ideal tier for a complexity bucket.
fn ideal_tier(complexity: Complexity) -> u8 {
    match complexity {
        Complexity::Trivial | Complexity::Simple => 0,
        Complexity::Moderate => 1,
        Complexity::Complex => 2,
        Complexity::Expert => 3,
    }
}

/// Score a candidate model for an analyzed request.
///
/// Returns a score in [0, 1]-ish range, where higher is better. Models on a
/// suppressed low tier are penalized multiplicatively by `low_tier_penalty`.
pub fn score_candidate(
    model: &Model,
    analysis: &QueryAnalysis,
    suppress_low_tier: bool,
    prefer_high_tier: bool,
    low_tier_penalty: f64,
    weights: &RouterWeights,
) -> f64 {
    // (a) complexity-tier fit: each tier of distance costs a quarter
    let distance = f64::from(ideal_tier(analysis.complexity).abs_diff(model.tier));
    let complexity_fit = (1.0 - 0.25 * distance).max(0.0);

    // (b) capability match: fraction of required capabilities the model has
    let capability = if analysis.required_capabilities.is_empty() {
        1.0
    } else {
        let matched = analysis
            .required_capabilities
            .iter()
            .filter(|cap| model.has_capability(cap))
            .count();
        matched as f64 / analysis.required_capabilities.len() as f64
    };

    // (c) priority fit against the model's implicit accuracy/speed/cost triple
    let accuracy = f64::from(model.tier) / 4.0;
    let speed = (1.0 - f64::from(model.latency_hint_ms) / 5_000.0).clamp(0.0, 1.0);
    let cost = 1.0 - f64::from(model.tier) / 4.0;
    let priority = analysis.priority_balance.accuracy * accuracy
        + analysis.priority_balance.speed * speed
        + analysis.priority_balance.cost * cost;

    // (d) domain specialization bonus
    let domain = if analysis
        .domain
        .iter()
        .any(|d| model.priority_keywords.contains(d))
    {
        1.0
    } else {
        0.0
    };

    let mut score = weights.complexity_fit * complexity_fit
        + weights.capability * capability
        + weights.priority * priority
        + weights.domain * domain;

    if suppress_low_tier && model.tier <= 1 {
        score *= low_tier_penalty;
    }
    if prefer_high_tier && model.tier >= 2 {
        score *= 1.1;
    }

    score
}
