//! Budget accounting configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Budget enforcement configuration.
///
/// Thresholds are expressed as fractions of `monthly_budget`; a request that
/// would push utilization past `critical_threshold` is denied pre-flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BudgetConfig {
    /// Monthly spending budget in USD
    pub monthly_budget: f64,

    /// Utilization fraction (0-1) that emits a warning alert
    pub warning_threshold: f64,

    /// Utilization fraction (0-1) past which requests are denied
    pub critical_threshold: f64,

    /// Pause all admission once the monthly budget is fully spent
    pub auto_pause_at_limit: bool,

    /// Maximum projected cost for a single request (USD)
    pub max_request_cost: f64,

    /// Maximum accumulated cost for a single usage session (USD)
    pub max_session_cost: f64,

    /// Day of month when the billing cycle resets (1-28)
    pub budget_reset_day: u8,

    /// IANA timezone name used for the billing cycle
    pub timezone: String,

    /// Optional per-tier allocation weights (tier -> fraction of budget)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier_allocation: Option<BTreeMap<u8, f64>>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            monthly_budget: 100.0,
            warning_threshold: 0.8,
            critical_threshold: 0.95,
            auto_pause_at_limit: true,
            max_request_cost: 2.0,
            max_session_cost: 10.0,
            budget_reset_day: 1,
            timezone: "UTC".to_string(),
            tier_allocation: None,
        }
    }
}

impl BudgetConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.monthly_budget < 0.0 {
            return Err("monthly_budget must be >= 0.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.warning_threshold) {
            return Err("warning_threshold must be in 0.0-1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.critical_threshold) {
            return Err("critical_threshold must be in 0.0-1.0".to_string());
        }

        if self.critical_threshold < self.warning_threshold {
            return Err("critical_threshold must be >= warning_threshold".to_string());
        }

        if self.max_request_cost < 0.0 || self.max_session_cost < 0.0 {
            return Err("cost caps must be >= 0.0".to_string());
        }

        if !(1..=28).contains(&self.budget_reset_day) {
            return Err("budget_reset_day must be 1-28".to_string());
        }

        if let Some(allocation) = &self.tier_allocation {
            for (tier, weight) in allocation {
                if *tier > 4 {
                    return Err(format!("tier_allocation tier {} out of range 0-4", tier));
                }
                if *weight < 0.0 {
                    return Err("tier_allocation weights must be >= 0.0".to_string());
                }
            }
        }

        Ok(())
    }
}
