//! Quality controller - post-response cascade and refinement.
//!
//! Decides whether a response should be redone on a higher tier (cascade)
//! or improved by a higher tier (refinement), and drives either path
//! through the shared model executor.

use crate::api::{Request, Response, TokenUsage};
use crate::config::CollaborationConfig;
use crate::orchestrator::ModelExecutor;
use crate::registry::{Model, ProviderRegistry};
use std::sync::Arc;

/// Combine token usages across chained calls.
fn combine_usage(a: &TokenUsage, b: &TokenUsage) -> TokenUsage {
    TokenUsage {
        input: a.input + b.input,
        output: a.output + b.output,
        total: a.total + b.total,
        cached: match (a.cached, b.cached) {
            (None, None) => None,
            (x, y) => Some(x.unwrap_or(0) + y.unwrap_or(0)),
        },
        reasoning: match (a.reasoning, b.reasoning) {
            (None, None) => None,
            (x, y) => Some(x.unwrap_or(0) + y.unwrap_or(0)),
        },
    }
}

/// Post-response quality controller.
pub struct QualityController {
    registry: Arc<ProviderRegistry>,
    config: CollaborationConfig,
}

impl QualityController {
    /// Create a controller over the registry with the given knobs.
    pub fn new(registry: Arc<ProviderRegistry>, config: CollaborationConfig) -> Self {
        Self { registry, config }
    }

    /// Whether the response should be redone on a higher tier.
    ///
    /// Triggers on failure, on suspiciously short output, or on low analysis
    /// confidence - but only when cascading is enabled.
    pub fn should_cascade(&self, response: &Response, confidence: f64) -> bool {
        if !self.config.cascade_enabled {
            return false;
        }
        !response.success
            || response.text.chars().count() < self.config.min_response_length
            || confidence < self.config.min_confidence
    }

    /// Whether a passing response should be improved on a higher tier.
    ///
    /// Never refines the top tier. Tier-0 responses are only worth refining
    /// when they carry a code block.
    pub fn should_refine(&self, response: &Response, model: &Model) -> bool {
        if !self.config.refinement_enabled || !response.success {
            return false;
        }
        if model.tier >= 4 {
            return false;
        }
        if model.tier == 0 && !response.text.contains("```") {
            return false;
        }
        true
    }

    /// Re-execute the request on the lowest healthy tier strictly above the
    /// failed model. Returns the original response unchanged when no higher
    /// tier exists. The returned response carries the summed cost of both
    /// calls and is flagged as an escalated fallback.
    pub async fn cascade(
        &self,
        executor: &dyn ModelExecutor,
        request: &Request,
        failed_model: &Model,
        failed_response: Response,
        session_id: &str,
    ) -> Response {
        let target = match self.registry.lowest_tier_above(failed_model.tier) {
            Some(model) => model,
            None => {
                tracing::debug!(
                    model = %failed_model.id,
                    tier = failed_model.tier,
                    "cascade requested but no higher tier exists"
                );
                return failed_response;
            }
        };

        tracing::info!(
            from = %failed_model.id,
            from_tier = failed_model.tier,
            to = %target.id,
            to_tier = target.tier,
            "cascading to higher tier"
        );

        let mut retried = executor
            .execute(&target, &request.prompt, session_id)
            .await;
        retried.fallback_used = true;
        retried.tier_escalated = true;
        retried.cost = failed_response.cost.accumulate(&retried.cost);
        retried.token_usage = combine_usage(&failed_response.token_usage, &retried.token_usage);
        retried.latency_ms += failed_response.latency_ms;
        retried
    }

    /// Improve a passing response on the lowest higher-tier model, carrying
    /// the original prompt and the draft text in a synthesized refinement
    /// prompt. Cost accumulates with the base response.
    pub async fn refine(
        &self,
        executor: &dyn ModelExecutor,
        request: &Request,
        base: Response,
        base_model: &Model,
        session_id: &str,
    ) -> Response {
        let target = match self.registry.lowest_tier_above(base_model.tier) {
            Some(model) => model,
            None => return base,
        };

        let refinement_prompt = format!(
            "Improve the draft answer below. Keep everything that is correct, \
             fix what is wrong, and tighten the writing.\n\n\
             Original request:\n{}\n\nDraft answer:\n{}",
            request.prompt, base.text
        );

        tracing::info!(
            from = %base_model.id,
            to = %target.id,
            "refining response on higher tier"
        );

        let refined = executor
            .execute(&target, &refinement_prompt, session_id)
            .await;

        if !refined.success {
            // A failed refinement never degrades a passing answer.
            return base;
        }

        Response {
            cost: base.cost.accumulate(&refined.cost),
            token_usage: combine_usage(&base.token_usage, &refined.token_usage),
            latency_ms: base.latency_ms + refined.latency_ms,
            fallback_used: base.fallback_used,
            tier_escalated: base.tier_escalated,
            ..refined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, GenerateOptions, GenerateOutput, ProviderAgent, UsageStats};
    use crate::api::ErrorCode;
    use crate::cost::CostBreakdown;
    use crate::registry::Provider;
    use async_trait::async_trait;

    struct NullAgent;

    #[async_trait]
    impl ProviderAgent for NullAgent {
        fn id(&self) -> &str {
            "null"
        }
        fn name(&self) -> &str {
            "Null"
        }
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<GenerateOutput, AgentError> {
            Err(AgentError::Unsupported("generate"))
        }
        async fn health(&self) -> bool {
            true
        }
        fn stats(&self) -> UsageStats {
            UsageStats::default()
        }
    }

    /// Executor that answers with a fixed text and per-call cost.
    struct FixedExecutor {
        text: String,
        cost: f64,
    }

    #[async_trait]
    impl ModelExecutor for FixedExecutor {
        async fn execute(&self, model: &Model, _prompt: &str, _session_id: &str) -> Response {
            Response {
                success: true,
                model_used: model.id.clone(),
                tier_used: model.tier,
                text: self.text.clone(),
                token_usage: TokenUsage::new(10, 20),
                cost: CostBreakdown {
                    total_cost: self.cost,
                    ..CostBreakdown::zero()
                },
                latency_ms: 40,
                fallback_used: false,
                tier_escalated: false,
                error: None,
            }
        }
    }

    fn registry_with_tiers(tiers: &[u8]) -> Arc<ProviderRegistry> {
        let registry = Arc::new(ProviderRegistry::new());
        for tier in tiers {
            registry
                .register(
                    Model::new(format!("m{}", tier), Provider::Anthropic, *tier),
                    Arc::new(NullAgent),
                )
                .unwrap();
        }
        registry
    }

    fn passing_response(text: &str) -> Response {
        Response {
            success: true,
            model_used: "m0".to_string(),
            tier_used: 0,
            text: text.to_string(),
            token_usage: TokenUsage::new(5, 5),
            cost: CostBreakdown {
                total_cost: 0.01,
                ..CostBreakdown::zero()
            },
            latency_ms: 30,
            fallback_used: false,
            tier_escalated: false,
            error: None,
        }
    }

    fn controller(tiers: &[u8], config: CollaborationConfig) -> QualityController {
        QualityController::new(registry_with_tiers(tiers), config)
    }

    #[test]
    fn cascade_triggers_on_short_text() {
        let controller = controller(&[0, 1], CollaborationConfig::default());
        let response = passing_response("ok");
        assert!(controller.should_cascade(&response, 0.9));
    }

    #[test]
    fn cascade_triggers_on_failure_and_low_confidence() {
        let controller = controller(&[0, 1], CollaborationConfig::default());
        let failed = Response::failure(ErrorCode::GenerationError, "boom", 10);
        assert!(controller.should_cascade(&failed, 0.9));

        let fine = passing_response("a perfectly reasonable long response body");
        assert!(controller.should_cascade(&fine, 0.1));
        assert!(!controller.should_cascade(&fine, 0.9));
    }

    #[test]
    fn cascade_disabled_never_triggers() {
        let controller = controller(
            &[0, 1],
            CollaborationConfig {
                cascade_enabled: false,
                ..Default::default()
            },
        );
        let failed = Response::failure(ErrorCode::GenerationError, "boom", 10);
        assert!(!controller.should_cascade(&failed, 0.0));
    }

    #[test]
    fn refine_gating_rules() {
        let config = CollaborationConfig {
            refinement_enabled: true,
            ..Default::default()
        };
        let controller = controller(&[0, 1, 4], config);

        let tier0 = Model::new("m0", Provider::Anthropic, 0);
        let tier4 = Model::new("m4", Provider::Anthropic, 4);

        let prose = passing_response("plain prose answer without any code in it");
        let code = passing_response("```rust\nfn main() {}\n```");

        // tier-0 refines only when a code block is present
        assert!(!controller.should_refine(&prose, &tier0));
        assert!(controller.should_refine(&code, &tier0));
        // top tier never refines
        assert!(!controller.should_refine(&code, &tier4));
    }

    #[tokio::test]
    async fn cascade_sums_cost_and_sets_flags() {
        let controller = controller(&[0, 1, 2], CollaborationConfig::default());
        let executor = FixedExecutor {
            text: "a much better and longer answer from the higher tier".to_string(),
            cost: 0.05,
        };

        let failed_model = Model::new("m0", Provider::Anthropic, 0);
        let failed = passing_response("meh");

        let result = controller
            .cascade(&executor, &Request::new("do it"), &failed_model, failed, "s1")
            .await;

        assert!(result.success);
        assert_eq!(result.model_used, "m1");
        assert_eq!(result.tier_used, 1);
        assert!(result.fallback_used);
        assert!(result.tier_escalated);
        assert!((result.cost.total_cost - 0.06).abs() < 1e-9);
        assert_eq!(result.token_usage.total, 40);
    }

    #[tokio::test]
    async fn cascade_without_higher_tier_returns_original() {
        let controller = controller(&[2], CollaborationConfig::default());
        let executor = FixedExecutor {
            text: "unused".to_string(),
            cost: 1.0,
        };

        let model = Model::new("m2", Provider::Anthropic, 2);
        let original = passing_response("short");
        let result = controller
            .cascade(&executor, &Request::new("x"), &model, original.clone(), "s1")
            .await;

        assert_eq!(result.text, original.text);
        assert!(!result.tier_escalated);
    }

    #[tokio::test]
    async fn refine_accumulates_cost_and_keeps_success() {
        let controller = controller(
            &[0, 1],
            CollaborationConfig {
                refinement_enabled: true,
                ..Default::default()
            },
        );
        let executor = FixedExecutor {
            text: "polished".to_string(),
            cost: 0.02,
        };

        let base_model = Model::new("m0", Provider::Anthropic, 0);
        let base = passing_response("```js\nx\n```");

        let result = controller
            .refine(&executor, &Request::new("write code"), base, &base_model, "s1")
            .await;

        assert!(result.success);
        assert_eq!(result.text, "polished");
        assert_eq!(result.model_used, "m1");
        assert!((result.cost.total_cost - 0.03).abs() < 1e-9);
    }
}
