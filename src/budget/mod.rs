//! Budget ledger - pre-flight admission and post-flight reconciliation.
//!
//! Keeps monthly running totals per tier and per model, per-session usage,
//! and an append-only alert log. Monthly totals are serialized behind a
//! commit lock so the monotonic accumulator is correct under contention;
//! no lock is ever held across an outbound adapter call.

pub mod alerts;
pub mod session;

pub use alerts::{Alert, AlertKind, AlertLog};
pub use session::{ModelBreakdown, SessionStatus, UsageSession, UsageTracker};

use crate::api::{ErrorCode, TokenUsage};
use crate::config::BudgetConfig;
use crate::cost::{CostBreakdown, CostCalculator};
use chrono::{DateTime, Datelike, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// Outcome of a pre-flight admission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Error code the caller should surface on denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub warnings: Vec<String>,
    pub estimated_cost: f64,
}

impl AdmissionDecision {
    fn approved(estimated_cost: f64, warnings: Vec<String>) -> Self {
        Self {
            approved: true,
            reason: None,
            code: None,
            warnings,
            estimated_cost,
        }
    }

    fn denied(estimated_cost: f64, code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            code: Some(code),
            warnings: Vec::new(),
            estimated_cost,
        }
    }
}

/// Monthly spending accumulators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonthTotals {
    pub total: f64,
    pub per_tier: BTreeMap<u8, f64>,
    pub per_model: BTreeMap<String, f64>,
}

/// Free-tier consumption for one model within a billing month.
#[derive(Debug, Clone, Default)]
struct FreeTierUse {
    month_key: String,
    requests: u32,
    tokens: u64,
}

/// Compute the billing-month key for a timestamp, honoring the reset day.
///
/// Days before the reset day belong to the previous billing month.
pub fn billing_month_key(at: DateTime<Utc>, reset_day: u8) -> String {
    if at.day() >= u32::from(reset_day) {
        at.format("%Y-%m").to_string()
    } else {
        let first = at
            .date_naive()
            .with_day(1)
            .unwrap_or_else(|| at.date_naive());
        let prev = first - Duration::days(1);
        prev.format("%Y-%m").to_string()
    }
}

/// Remove `covered` tokens from a usage, consuming input first, then output,
/// then the cached and reasoning buckets.
fn subtract_free(usage: &TokenUsage, covered: u32) -> TokenUsage {
    let mut remaining = covered;
    let mut take = |bucket: u32| -> u32 {
        let taken = bucket.min(remaining);
        remaining -= taken;
        bucket - taken
    };

    let input = take(usage.input);
    let output = take(usage.output);
    let cached = usage.cached.map(&mut take);
    let reasoning = usage.reasoning.map(&mut take);

    TokenUsage {
        input,
        output,
        total: usage.total.saturating_sub(covered),
        cached,
        reasoning,
    }
}

/// The budget ledger.
pub struct BudgetLedger {
    config: BudgetConfig,
    calculator: CostCalculator,
    months: DashMap<String, MonthTotals>,
    free_tier: DashMap<String, FreeTierUse>,
    sessions: UsageTracker,
    alerts: AlertLog,
    /// Serializes post-flight commits so readers never observe partial updates
    commit: Mutex<()>,
}

impl BudgetLedger {
    /// Create a ledger over the given configuration and calculator.
    pub fn new(config: BudgetConfig, calculator: CostCalculator) -> Self {
        Self {
            config,
            calculator,
            months: DashMap::new(),
            free_tier: DashMap::new(),
            sessions: UsageTracker::new(),
            alerts: AlertLog::new(),
            commit: Mutex::new(()),
        }
    }

    /// The active budget configuration.
    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Per-session usage tracker.
    pub fn sessions(&self) -> &UsageTracker {
        &self.sessions
    }

    /// The alert log.
    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    /// The current billing-month key.
    fn current_month_key(&self) -> String {
        billing_month_key(Utc::now(), self.config.budget_reset_day)
    }

    /// Monthly utilization: spend / budget. May exceed 1.0 (overshoot stays
    /// visible); 0.0 when no budget is configured.
    pub fn utilization(&self) -> f64 {
        if self.config.monthly_budget <= 0.0 {
            return 0.0;
        }
        let spent = self
            .months
            .get(&self.current_month_key())
            .map(|m| m.total)
            .unwrap_or(0.0);
        spent / self.config.monthly_budget
    }

    /// Snapshot of the current month's totals.
    pub fn month_totals(&self) -> MonthTotals {
        self.months
            .get(&self.current_month_key())
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Spend for one tier in the current month.
    pub fn tier_spend(&self, tier: u8) -> f64 {
        self.month_totals()
            .per_tier
            .get(&tier)
            .copied()
            .unwrap_or(0.0)
    }

    /// Free-tier tokens still available for a model this billing month.
    fn free_tokens_remaining(&self, model_id: &str) -> u32 {
        let pricing = match self.calculator.table().get(model_id) {
            Some(p) => p,
            None => return 0,
        };
        let quota = match pricing.free_tier {
            Some(q) => q,
            None => return 0,
        };

        let month_key = billing_month_key(Utc::now(), quota.reset_day);
        let used = self
            .free_tier
            .get(model_id)
            .filter(|u| u.month_key == month_key)
            .map(|u| (u.requests, u.tokens))
            .unwrap_or((0, 0));

        if used.0 >= quota.requests_per_month {
            return 0;
        }
        quota
            .tokens_per_month
            .saturating_sub(used.1)
            .min(u64::from(u32::MAX)) as u32
    }

    /// Consume free-tier quota for an actual request; returns covered tokens.
    fn consume_free_tier(&self, model_id: &str, usage: &TokenUsage) -> u32 {
        let pricing = match self.calculator.table().get(model_id) {
            Some(p) => p,
            None => return 0,
        };
        let quota = match pricing.free_tier {
            Some(q) => q,
            None => return 0,
        };

        let month_key = billing_month_key(Utc::now(), quota.reset_day);
        let mut entry = self.free_tier.entry(model_id.to_string()).or_default();
        if entry.month_key != month_key {
            entry.month_key = month_key;
            entry.requests = 0;
            entry.tokens = 0;
        }

        if entry.requests >= quota.requests_per_month {
            return 0;
        }

        let remaining = quota.tokens_per_month.saturating_sub(entry.tokens);
        let covered = remaining.min(u64::from(usage.total)) as u32;

        entry.requests += 1;
        entry.tokens += u64::from(covered);
        covered
    }

    /// Cost of a usage after free-tier coverage. The minimum charge applies
    /// only to the non-free residue; a fully covered request costs nothing.
    fn charge_after_free(
        &self,
        model_id: &str,
        usage: &TokenUsage,
        covered: u32,
    ) -> CostBreakdown {
        if covered >= usage.total {
            return CostBreakdown::zero();
        }
        let residue = subtract_free(usage, covered);
        match self.calculator.calculate(model_id, &residue) {
            Ok(breakdown) => breakdown,
            Err(err) => {
                tracing::warn!(model = %model_id, error = %err, "no pricing row; charging zero");
                CostBreakdown::zero()
            }
        }
    }

    /// Pre-flight admission check.
    ///
    /// Denies when the projected cost breaks the per-request cap, the
    /// per-session cap, or would push monthly utilization past the critical
    /// threshold. Crossing the warning threshold is reported but admissible.
    pub fn pre_request_check(
        &self,
        model_id: &str,
        session_id: &str,
        estimated: &TokenUsage,
    ) -> AdmissionDecision {
        let free_remaining = self.free_tokens_remaining(model_id);
        let covered = free_remaining.min(estimated.total);
        let estimated_cost = self.charge_after_free(model_id, estimated, covered).total_cost;

        if self.config.auto_pause_at_limit && self.utilization() >= 1.0 {
            return AdmissionDecision::denied(
                estimated_cost,
                ErrorCode::BudgetExceeded,
                "monthly budget exhausted and auto-pause is enabled",
            );
        }

        if estimated_cost > self.config.max_request_cost {
            return AdmissionDecision::denied(
                estimated_cost,
                ErrorCode::CostLimitExceeded,
                format!(
                    "projected request cost ${:.4} exceeds max_request_cost ${:.4}",
                    estimated_cost, self.config.max_request_cost
                ),
            );
        }

        let session_cost = self.sessions.session_cost(session_id);
        if session_cost + estimated_cost > self.config.max_session_cost {
            return AdmissionDecision::denied(
                estimated_cost,
                ErrorCode::CostLimitExceeded,
                format!(
                    "projected session cost ${:.4} exceeds max_session_cost ${:.4}",
                    session_cost + estimated_cost,
                    self.config.max_session_cost
                ),
            );
        }

        if self.config.monthly_budget > 0.0 {
            let projected =
                (self.month_totals().total + estimated_cost) / self.config.monthly_budget;
            if projected > self.config.critical_threshold {
                return AdmissionDecision::denied(
                    estimated_cost,
                    ErrorCode::BudgetExceeded,
                    format!(
                        "projected utilization {:.1}% exceeds critical threshold {:.1}%",
                        projected * 100.0,
                        self.config.critical_threshold * 100.0
                    ),
                );
            }

            let mut warnings = Vec::new();
            if projected >= self.config.warning_threshold {
                warnings.push(format!(
                    "projected utilization {:.1}% crosses warning threshold {:.1}%",
                    projected * 100.0,
                    self.config.warning_threshold * 100.0
                ));
            }
            return AdmissionDecision::approved(estimated_cost, warnings);
        }

        AdmissionDecision::approved(estimated_cost, Vec::new())
    }

    /// Post-flight reconciliation with actual token counts.
    ///
    /// Applies session, model-breakdown, monthly and per-tier updates as one
    /// logical commit, appends alerts for thresholds crossed by this request,
    /// and returns the charged cost breakdown.
    pub fn post_request_processing(
        &self,
        session_id: &str,
        model_id: &str,
        tier: u8,
        actual: &TokenUsage,
        latency_ms: u64,
        success: bool,
    ) -> CostBreakdown {
        let _guard = self.commit.lock().unwrap_or_else(PoisonError::into_inner);

        let covered = self.consume_free_tier(model_id, actual);
        let breakdown = self.charge_after_free(model_id, actual, covered);
        let cost = breakdown.total_cost;

        metrics::histogram!("strata_cost_per_request_usd", "model" => model_id.to_string())
            .record(cost);

        let before = self.utilization();
        let tier_before = self.tier_spend(tier);

        let month_key = self.current_month_key();
        if !self.months.contains_key(&month_key) && !self.months.is_empty() {
            tracing::info!(month = %month_key, "budget reset: new billing cycle started");
            metrics::counter!("strata_budget_events_total", "event_type" => "month_rollover")
                .increment(1);
        }
        {
            let mut month = self.months.entry(month_key).or_default();
            month.total += cost;
            *month.per_tier.entry(tier).or_insert(0.0) += cost;
            *month.per_model.entry(model_id.to_string()).or_insert(0.0) += cost;
        }

        self.sessions
            .record(session_id, model_id, actual, cost, latency_ms, success);

        let after = self.utilization();
        self.emit_threshold_alerts(before, after, model_id);
        self.emit_tier_allocation_alert(tier, tier_before, self.tier_spend(tier));

        tracing::debug!(
            session = %session_id,
            model = %model_id,
            tier,
            cost_usd = cost,
            free_covered = covered,
            utilization = after,
            success,
            "post-flight reconciliation committed"
        );

        breakdown
    }

    /// Alert once when a tier's spend crosses its configured allocation.
    fn emit_tier_allocation_alert(&self, tier: u8, before: f64, after: f64) {
        let allocation = match &self.config.tier_allocation {
            Some(allocation) => allocation,
            None => return,
        };
        let weight = match allocation.get(&tier) {
            Some(weight) => *weight,
            None => return,
        };
        if self.config.monthly_budget <= 0.0 {
            return;
        }

        let threshold = weight * self.config.monthly_budget;
        if before <= threshold && after > threshold {
            self.alerts.append(
                AlertKind::Warning,
                format!(
                    "tier {} spend ${:.4} exceeded its allocation of ${:.4}",
                    tier, after, threshold
                ),
            );
            tracing::warn!(tier, spend = after, threshold, "tier allocation exceeded");
        }
    }

    fn emit_threshold_alerts(&self, before: f64, after: f64, model_id: &str) {
        let warning = self.config.warning_threshold;
        let critical = self.config.critical_threshold;

        if before < warning && after >= warning {
            self.alerts.append(
                AlertKind::Warning,
                format!(
                    "monthly utilization reached {:.1}% (model {})",
                    after * 100.0,
                    model_id
                ),
            );
            metrics::counter!("strata_budget_events_total", "event_type" => "warning")
                .increment(1);
        }

        if before < critical && after >= critical {
            self.alerts.append(
                AlertKind::Critical,
                format!(
                    "monthly utilization reached {:.1}% (model {})",
                    after * 100.0,
                    model_id
                ),
            );
            metrics::counter!("strata_budget_events_total", "event_type" => "critical")
                .increment(1);
        }

        if before < 1.0 && after >= 1.0 {
            self.alerts.append(
                AlertKind::CapExceeded,
                format!("monthly budget fully spent ({:.1}%)", after * 100.0),
            );
            metrics::counter!("strata_budget_events_total", "event_type" => "cap_exceeded")
                .increment(1);
        }
    }
}
