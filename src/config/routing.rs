//! Routing configuration

use crate::routing::TaskType;
use serde::{Deserialize, Serialize};

/// A keyword-driven task classification rule.
///
/// When any keyword matches the prompt, the rule's task type (and optional
/// preferred tier) applies before the analyzer-driven derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRule {
    pub keywords: Vec<String>,
    pub task_type: TaskType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_tier: Option<u8>,
}

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingConfig {
    /// Tier used when no escalation or task-type default applies
    pub default_tier: u8,

    /// Re-route to a lower tier when admission fails
    pub fallback_enabled: bool,

    /// Per-adapter-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Keyword-driven classification rules, checked in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub task_rules: Vec<TaskRule>,

    /// Forced-escalation score at which tier 3 and the flagship are forced
    pub escalation_force_score: u32,

    /// Forced-escalation score at which low tiers are suppressed
    pub escalation_suppress_score: u32,

    /// Forced-escalation score at which tier 2 is preferred
    pub escalation_prefer_score: u32,

    /// Number of flagship-class signals that classify a task as critical
    pub flagship_signal_threshold: u32,

    /// Model forced when the escalation score reaches `escalation_force_score`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagship_model: Option<String>,

    /// Multiplicative score penalty applied to suppressed low-tier models
    pub low_tier_penalty: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_tier: 1,
            fallback_enabled: true,
            timeout_ms: 30_000,
            task_rules: Vec::new(),
            escalation_force_score: 5,
            escalation_suppress_score: 3,
            escalation_prefer_score: 2,
            flagship_signal_threshold: 2,
            flagship_model: None,
            low_tier_penalty: 0.2,
        }
    }
}

impl RoutingConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.default_tier > 4 {
            return Err("default_tier must be 0-4".to_string());
        }

        if self.timeout_ms == 0 {
            return Err("timeout_ms must be > 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.low_tier_penalty) {
            return Err("low_tier_penalty must be in 0.0-1.0".to_string());
        }

        for rule in &self.task_rules {
            if rule.keywords.is_empty() {
                return Err("task rule must have at least one keyword".to_string());
            }
            if let Some(tier) = rule.preferred_tier {
                if tier > 4 {
                    return Err("task rule preferred_tier must be 0-4".to_string());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_defaults_are_valid() {
        let config = RoutingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_tier, 1);
        assert!(config.fallback_enabled);
        assert_eq!(config.timeout_ms, 30_000);
        assert_eq!(config.low_tier_penalty, 0.2);
    }

    #[test]
    fn rejects_tier_out_of_range() {
        let config = RoutingConfig {
            default_tier: 5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_rule_keywords() {
        let config = RoutingConfig {
            task_rules: vec![TaskRule {
                keywords: vec![],
                task_type: TaskType::Coding,
                preferred_tier: None,
            }],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
