//! Router - task classification and model selection.
//!
//! Combines the query analysis with the provider registry and the budget
//! ledger to choose exactly one model per request, honoring user overrides,
//! forced-escalation rules, low-tier suppression, and budget admission.
//! The router never panics; every failure is a `RoutingError` the caller
//! maps to a synthetic error response.

pub mod error;
pub mod scoring;

pub use error::RoutingError;
pub use scoring::{score_candidate, RouterWeights};

use crate::analyzer::{
    Complexity, CreativityLevel, IntentCategory, QualityRequirement, QueryAnalysis, ReasoningDepth,
};
use crate::api::{Request, TokenUsage};
use crate::budget::{AdmissionDecision, BudgetLedger};
use crate::config::RoutingConfig;
use crate::registry::{Model, ProviderRegistry};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

/// Task categories a request can be routed as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Let the router classify
    Auto,
    /// Flagship-class work
    Critical,
    /// High-quality generalist work
    Premium,
    /// Multi-step analytical work
    ComplexAnalysis,
    /// Code generation and review
    Coding,
    /// Everyday requests
    General,
    /// Retrieval over a knowledge base
    RagSearch,
    /// Retrieval over caller-provided files
    FileSearch,
    /// Sandboxed code execution
    CodeInterpreter,
    /// Conversational assistant
    GeneralAssistant,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskType::Auto => "auto",
            TaskType::Critical => "critical",
            TaskType::Premium => "premium",
            TaskType::ComplexAnalysis => "complex_analysis",
            TaskType::Coding => "coding",
            TaskType::General => "general",
            TaskType::RagSearch => "rag_search",
            TaskType::FileSearch => "file_search",
            TaskType::CodeInterpreter => "code_interpreter",
            TaskType::GeneralAssistant => "general_assistant",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskType {
    type Err = RoutingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(TaskType::Auto),
            "critical" => Ok(TaskType::Critical),
            "premium" => Ok(TaskType::Premium),
            "complex_analysis" => Ok(TaskType::ComplexAnalysis),
            "coding" => Ok(TaskType::Coding),
            "general" => Ok(TaskType::General),
            "rag_search" => Ok(TaskType::RagSearch),
            "file_search" => Ok(TaskType::FileSearch),
            "code_interpreter" => Ok(TaskType::CodeInterpreter),
            "general_assistant" => Ok(TaskType::GeneralAssistant),
            other => Err(RoutingError::InvalidTaskType(other.to_string())),
        }
    }
}

impl TaskType {
    /// Minimum tier this task type starts from, before forced escalation.
    fn default_min_tier(self, config: &RoutingConfig) -> u8 {
        match self {
            TaskType::Critical => 3,
            TaskType::Premium | TaskType::ComplexAnalysis => 2,
            TaskType::RagSearch | TaskType::FileSearch | TaskType::CodeInterpreter => 1,
            TaskType::Coding | TaskType::GeneralAssistant => 0,
            TaskType::General | TaskType::Auto => config.default_tier,
        }
    }

    /// One level up the escalation ladder, applied when the conversation
    /// context signals sustained difficulty.
    pub fn escalate(self) -> Self {
        match self {
            TaskType::General | TaskType::GeneralAssistant => TaskType::ComplexAnalysis,
            TaskType::Coding => TaskType::Premium,
            TaskType::ComplexAnalysis => TaskType::Premium,
            TaskType::Premium => TaskType::Critical,
            other => other,
        }
    }
}

/// Result of the forced-escalation evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForcedEscalation {
    /// Combined escalation signal score
    pub score: u32,
    /// Minimum candidate tier after escalation
    pub min_tier: u8,
    /// Designated flagship model forced at the highest score band
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forced_model: Option<String>,
    /// Low tiers receive a strong scoring penalty
    pub suppress_low_tier: bool,
    /// Tier 2+ receives a mild scoring preference
    pub prefer_high_tier: bool,
}

/// A routing decision: the chosen model plus the rationale trail.
#[derive(Debug, Clone)]
pub struct Selection {
    pub model: Model,
    pub task_type: TaskType,
    pub escalation: ForcedEscalation,
    pub admission: AdmissionDecision,
    /// Explanation of the decision, e.g. "score:0.82 task:coding min_tier:0"
    pub rationale: String,
    /// Up to three next-best candidate ids
    pub alternatives: Vec<String>,
    /// True when budget denial re-routed to a lower tier
    pub fallback_used: bool,
}

/// Router selects the best model for each request.
pub struct Router {
    registry: Arc<ProviderRegistry>,
    ledger: Arc<BudgetLedger>,
    config: RoutingConfig,
    weights: RouterWeights,
}

impl Router {
    /// Create a new router.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        ledger: Arc<BudgetLedger>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            registry,
            ledger,
            config,
            weights: RouterWeights::default(),
        }
    }

    /// Create a router with explicit scoring weights.
    pub fn with_weights(
        registry: Arc<ProviderRegistry>,
        ledger: Arc<BudgetLedger>,
        config: RoutingConfig,
        weights: RouterWeights,
    ) -> Self {
        Self {
            registry,
            ledger,
            config,
            weights,
        }
    }

    /// The routing configuration.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    /// Number of flagship-class signals present in the analysis.
    fn flagship_signals(&self, analysis: &QueryAnalysis) -> u32 {
        let mut signals = 0;
        if analysis.complexity == Complexity::Expert {
            signals += 1;
        }
        if analysis.reasoning_depth == ReasoningDepth::Deep {
            signals += 1;
        }
        if analysis.quality_requirement == QualityRequirement::Exceptional {
            signals += 1;
        }
        if analysis.creativity_level == CreativityLevel::Innovative {
            signals += 1;
        }
        if analysis.domain.len() >= 3 {
            signals += 1;
        }
        if analysis.priority_balance.accuracy > 0.8 {
            signals += 1;
        }
        if analysis.has_strategic_cues() {
            signals += 1;
        }
        if analysis.estimated_processing_seconds > 20.0 {
            signals += 1;
        }
        signals
    }

    /// Derive the task type for a request.
    ///
    /// A user-specified non-auto task type is honored as-is; the analysis
    /// still drives routing weights downstream.
    pub fn classify(&self, request: &Request, analysis: &QueryAnalysis) -> TaskType {
        if let Some(task_type) = request.task_type {
            if task_type != TaskType::Auto {
                return task_type;
            }
        }

        let lower = request.prompt.to_lowercase();
        for rule in &self.config.task_rules {
            if rule.keywords.iter().any(|k| lower.contains(&k.to_lowercase())) {
                return rule.task_type;
            }
        }

        let derived = self.derive_task_type(analysis);

        if analysis.context_factors.iter().any(|f| f == "task_bump") {
            let bumped = derived.escalate();
            if bumped != derived {
                tracing::debug!(
                    from = %derived,
                    to = %bumped,
                    factor = analysis.escalation_factor,
                    "context escalation bumped task type"
                );
            }
            return bumped;
        }

        derived
    }

    fn derive_task_type(&self, analysis: &QueryAnalysis) -> TaskType {
        // Rule 1: flagship-class signal count
        if self.flagship_signals(analysis) >= self.config.flagship_signal_threshold {
            return TaskType::Critical;
        }

        // Capability-specific task types
        if analysis.required_capabilities.contains("rag_search") {
            return TaskType::RagSearch;
        }
        if analysis.required_capabilities.contains("file_search") {
            return TaskType::FileSearch;
        }
        if analysis.required_capabilities.contains("code_interpreter") {
            return TaskType::CodeInterpreter;
        }

        let coding = analysis.required_capabilities.contains("coding");

        // Rule 2: complex and expert work
        if analysis.complexity >= Complexity::Complex {
            if coding {
                return TaskType::Coding;
            }
            if analysis.intent_category == IntentCategory::Analysis {
                return TaskType::ComplexAnalysis;
            }
            return TaskType::Premium;
        }

        // Rule 3: moderate work
        if analysis.complexity == Complexity::Moderate {
            if coding {
                return TaskType::Coding;
            }
            if analysis.intent_category == IntentCategory::Analysis {
                return TaskType::ComplexAnalysis;
            }
            return TaskType::General;
        }

        // Rule 4: exceptional creative work
        if matches!(
            analysis.creativity_level,
            CreativityLevel::Creative | CreativityLevel::Innovative
        ) && analysis.quality_requirement == QualityRequirement::Exceptional
        {
            return TaskType::Premium;
        }

        // Rule 5: high-stakes decisions
        if analysis.intent_category == IntentCategory::Decision
            && analysis.quality_requirement >= QualityRequirement::High
        {
            return TaskType::Premium;
        }

        // Rule 6
        TaskType::General
    }

    /// Evaluate forced-escalation signals for a classified request.
    pub fn forced_escalation(
        &self,
        task_type: TaskType,
        analysis: &QueryAnalysis,
    ) -> ForcedEscalation {
        let mut score = match task_type {
            TaskType::Critical => 3,
            TaskType::Premium => 2,
            _ => 0,
        };

        match analysis.domain.len() {
            0 | 1 => {}
            2 => score += 1,
            _ => score += 2,
        }
        if analysis.complexity == Complexity::Expert {
            score += 1;
        }
        if analysis.quality_requirement == QualityRequirement::Exceptional {
            score += 1;
        }
        if analysis.reasoning_depth == ReasoningDepth::Deep {
            score += 1;
        }
        if analysis.has_strategic_cues() {
            score += 1;
        }
        if analysis
            .context_factors
            .iter()
            .any(|f| f == "diagnostic_cues")
        {
            score += 1;
        }

        let task_floor = task_type.default_min_tier(&self.config);

        if score >= self.config.escalation_force_score {
            ForcedEscalation {
                score,
                min_tier: 3.max(task_floor),
                forced_model: self.config.flagship_model.clone(),
                suppress_low_tier: true,
                prefer_high_tier: true,
            }
        } else if score >= self.config.escalation_suppress_score {
            ForcedEscalation {
                score,
                min_tier: 2.max(task_floor),
                forced_model: None,
                suppress_low_tier: true,
                prefer_high_tier: true,
            }
        } else if score >= self.config.escalation_prefer_score {
            ForcedEscalation {
                score,
                min_tier: task_floor,
                forced_model: None,
                suppress_low_tier: false,
                prefer_high_tier: true,
            }
        } else {
            ForcedEscalation {
                score,
                min_tier: task_floor,
                forced_model: None,
                suppress_low_tier: false,
                prefer_high_tier: false,
            }
        }
    }

    /// Select the best admissible model for the request.
    ///
    /// On budget denial every lower tier is tried in descending order before
    /// giving up (when fallback is enabled and no tier was pinned).
    pub fn select(
        &self,
        request: &Request,
        task_type: TaskType,
        analysis: &QueryAnalysis,
        session_id: &str,
    ) -> Result<Selection, RoutingError> {
        let escalation = self.forced_escalation(task_type, analysis);
        let estimated = TokenUsage::new(
            analysis.estimated_tokens.input,
            analysis.estimated_tokens.output,
        );

        // An explicit tier wins over any preferred tier a task rule carries.
        let pinned_tier = request.preferred_tier.or_else(|| {
            let lower = request.prompt.to_lowercase();
            self.config
                .task_rules
                .iter()
                .find(|rule| rule.keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
                .and_then(|rule| rule.preferred_tier)
        });

        let mut candidates = self.registry.list_models();
        if let Some(tier) = pinned_tier {
            candidates.retain(|m| m.tier == tier);
        } else {
            candidates.retain(|m| m.tier >= escalation.min_tier);
        }

        // A forced flagship narrows the field when it is actually available.
        if let Some(flagship) = &escalation.forced_model {
            if candidates.iter().any(|m| &m.id == flagship) {
                candidates.retain(|m| &m.id == flagship);
            }
        }

        if candidates.is_empty() && pinned_tier.is_none() {
            return Err(RoutingError::NoCandidate {
                task: task_type.to_string(),
            });
        }

        let mut denial_reason = None;
        let mut admissible: Vec<(Model, AdmissionDecision)> = Vec::new();
        for model in candidates {
            let decision = self.ledger.pre_request_check(&model.id, session_id, &estimated);
            if decision.approved {
                admissible.push((model, decision));
            } else if denial_reason.is_none() {
                denial_reason = decision.reason.clone();
            }
        }

        if admissible.is_empty() {
            if self.config.fallback_enabled && pinned_tier.is_none() {
                if let Some(selection) = self.budget_fallback(
                    task_type,
                    analysis,
                    &escalation,
                    &estimated,
                    session_id,
                ) {
                    return Ok(selection);
                }
            }
            return match denial_reason {
                Some(reason) => Err(RoutingError::BudgetDenied { reason }),
                None => Err(RoutingError::NoCandidate {
                    task: task_type.to_string(),
                }),
            };
        }

        Ok(self.rank(admissible, task_type, escalation, analysis, false))
    }

    /// Try tiers strictly below the escalated minimum, highest first.
    fn budget_fallback(
        &self,
        task_type: TaskType,
        analysis: &QueryAnalysis,
        escalation: &ForcedEscalation,
        estimated: &TokenUsage,
        session_id: &str,
    ) -> Option<Selection> {
        for tier in (0..escalation.min_tier).rev() {
            let mut admissible = Vec::new();
            for model in self.registry.models_at_tier(tier) {
                let decision = self.ledger.pre_request_check(&model.id, session_id, estimated);
                if decision.approved {
                    admissible.push((model, decision));
                }
            }
            if !admissible.is_empty() {
                tracing::warn!(
                    task = %task_type,
                    min_tier = escalation.min_tier,
                    fallback_tier = tier,
                    "budget denied escalated tiers, falling back"
                );
                return Some(self.rank(admissible, task_type, escalation.clone(), analysis, true));
            }
        }
        None
    }

    fn rank(
        &self,
        mut admissible: Vec<(Model, AdmissionDecision)>,
        task_type: TaskType,
        escalation: ForcedEscalation,
        analysis: &QueryAnalysis,
        fallback_used: bool,
    ) -> Selection {
        admissible.sort_by(|a, b| {
            let score_a = score_candidate(
                &a.0,
                analysis,
                escalation.suppress_low_tier,
                escalation.prefer_high_tier,
                self.config.low_tier_penalty,
                &self.weights,
            );
            let score_b = score_candidate(
                &b.0,
                analysis,
                escalation.suppress_low_tier,
                escalation.prefer_high_tier,
                self.config.low_tier_penalty,
                &self.weights,
            );
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let alternatives: Vec<String> = admissible
            .iter()
            .skip(1)
            .take(3)
            .map(|(m, _)| m.id.clone())
            .collect();

        let (model, admission) = admissible.swap_remove(0);
        let score = score_candidate(
            &model,
            analysis,
            escalation.suppress_low_tier,
            escalation.prefer_high_tier,
            self.config.low_tier_penalty,
            &self.weights,
        );

        let rationale = format!(
            "score:{:.2} task:{} min_tier:{} escalation:{}{}",
            score,
            task_type,
            escalation.min_tier,
            escalation.score,
            if fallback_used { " budget_fallback" } else { "" },
        );

        tracing::debug!(
            model = %model.id,
            tier = model.tier,
            rationale = %rationale,
            alternatives = ?alternatives,
            "routing decision made"
        );

        Selection {
            model,
            task_type,
            escalation,
            admission,
            rationale,
            alternatives,
            fallback_used,
        }
    }

    /// The highest-tier healthy model strictly below the given model's tier.
    pub fn fallback(&self, current: &Model) -> Option<Model> {
        self.registry.highest_tier_below(current.tier)
    }
}
