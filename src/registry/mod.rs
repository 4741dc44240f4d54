//! Provider Registry module.
//!
//! Thread-safe in-memory storage and querying of models and their adapters.
//! The model set is loaded at startup and immutable thereafter, except for an
//! explicit `reload`. Reads are lock-free (DashMap).

mod error;

pub use error::RegistryError;

use crate::agent::ProviderAgent;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

/// Backend provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Alibaba,
    Google,
    Anthropic,
    OpenAi,
    OpenRouter,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Provider::Alibaba => "alibaba",
            Provider::Google => "google",
            Provider::Anthropic => "anthropic",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
        };
        f.write_str(s)
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "alibaba" => Ok(Provider::Alibaba),
            "google" => Ok(Provider::Google),
            "anthropic" => Ok(Provider::Anthropic),
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            _ => Err(format!("Unknown provider: {}", s)),
        }
    }
}

/// Static metadata for a routable model. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Unique model identifier (e.g., "claude-sonnet")
    pub id: String,
    /// Provider family
    pub provider: Provider,
    /// Quality/cost tier (0-4)
    pub tier: u8,
    /// Capability tags (e.g., "coding", "reasoning", "rag_search")
    pub capabilities: BTreeSet<String>,
    /// Keywords that bias routing toward this model
    pub priority_keywords: BTreeSet<String>,
    /// Typical end-to-end latency in milliseconds
    pub latency_hint_ms: u32,
    /// Maximum output tokens
    pub max_tokens: u32,
}

impl Model {
    /// Create a model with empty capability sets.
    pub fn new(id: impl Into<String>, provider: Provider, tier: u8) -> Self {
        Self {
            id: id.into(),
            provider,
            tier,
            capabilities: BTreeSet::new(),
            priority_keywords: BTreeSet::new(),
            latency_hint_ms: 2_000,
            max_tokens: 8_192,
        }
    }

    /// Add capability tags.
    pub fn with_capabilities<I, S>(mut self, caps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(caps.into_iter().map(Into::into));
        self
    }

    /// Add priority keywords.
    pub fn with_priority_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.priority_keywords
            .extend(keywords.into_iter().map(Into::into));
        self
    }

    /// Set the latency hint.
    pub fn with_latency_hint(mut self, latency_ms: u32) -> Self {
        self.latency_hint_ms = latency_ms;
        self
    }

    /// Set the output token cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Whether the model advertises a capability tag.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.capabilities.contains(cap)
    }
}

/// Health as last observed for a model's adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Never probed
    Unknown,
    /// Last probe succeeded
    Healthy,
    /// Last probe failed
    Unhealthy,
}

/// Per-model health bookkeeping.
#[derive(Debug, Clone)]
struct HealthRecord {
    status: HealthStatus,
    last_check: Option<DateTime<Utc>>,
}

impl Default for HealthRecord {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unknown,
            last_check: None,
        }
    }
}

/// The built-in model catalog: the five provider families across tiers
/// 0-4, with ids matching the default pricing table.
pub fn default_catalog() -> Vec<Model> {
    vec![
        Model::new("qwen-flash", Provider::Alibaba, 0)
            .with_capabilities(["coding"])
            .with_priority_keywords(["coding"])
            .with_latency_hint(600),
        Model::new("gemini-flash-lite", Provider::Google, 0).with_latency_hint(500),
        Model::new("gpt-mini", Provider::OpenAi, 1)
            .with_capabilities(["coding"])
            .with_latency_hint(900),
        Model::new("gemini-flash", Provider::Google, 1)
            .with_capabilities(["file_search"])
            .with_latency_hint(800),
        Model::new("claude-sonnet", Provider::Anthropic, 2)
            .with_capabilities(["coding", "reasoning"])
            .with_priority_keywords(["coding"])
            .with_latency_hint(1_800)
            .with_max_tokens(16_384),
        Model::new("qwen-max", Provider::Alibaba, 2)
            .with_capabilities(["rag_search"])
            .with_latency_hint(2_200),
        Model::new("claude-opus", Provider::Anthropic, 3)
            .with_capabilities(["coding", "reasoning"])
            .with_latency_hint(3_200)
            .with_max_tokens(16_384),
        Model::new("gpt-omni", Provider::OpenAi, 3)
            .with_capabilities(["coding", "reasoning", "code_interpreter"])
            .with_latency_hint(3_000),
        Model::new("consensus-ultra", Provider::OpenRouter, 4)
            .with_capabilities(["reasoning"])
            .with_latency_hint(6_000),
    ]
}

/// The Provider Registry stores all routable models and their adapters.
///
/// Every registered adapter is reachable by its model id. `list_models`
/// returns only models whose adapter is healthy or has not yet been probed.
pub struct ProviderRegistry {
    models: DashMap<String, Model>,
    agents: DashMap<String, Arc<dyn ProviderAgent>>,
    health: DashMap<String, HealthRecord>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            models: DashMap::new(),
            agents: DashMap::new(),
            health: DashMap::new(),
        }
    }

    /// Create a registry pre-populated with the built-in catalog.
    ///
    /// The factory supplies one adapter per catalog model, so hosts can
    /// bind their own SDK clients (or mocks) to the default model set.
    pub fn with_defaults<F>(factory: F) -> Result<Self, RegistryError>
    where
        F: Fn(&Model) -> Arc<dyn ProviderAgent>,
    {
        let registry = Self::new();
        for model in default_catalog() {
            let agent = factory(&model);
            registry.register(model, agent)?;
        }
        Ok(registry)
    }

    /// Register a model together with its adapter.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::DuplicateModel` if the id is taken and
    /// `RegistryError::InvalidTier` if the tier is outside 0-4.
    pub fn register(
        &self,
        model: Model,
        agent: Arc<dyn ProviderAgent>,
    ) -> Result<(), RegistryError> {
        if model.tier > 4 {
            return Err(RegistryError::InvalidTier(model.tier));
        }

        let id = model.id.clone();
        if self.models.contains_key(&id) {
            return Err(RegistryError::DuplicateModel(id));
        }

        self.health.insert(id.clone(), HealthRecord::default());
        self.agents.insert(id.clone(), agent);
        self.models.insert(id, model);
        Ok(())
    }

    /// Replace the whole model set (explicit reload).
    pub fn reload(
        &self,
        entries: Vec<(Model, Arc<dyn ProviderAgent>)>,
    ) -> Result<(), RegistryError> {
        self.models.clear();
        self.agents.clear();
        self.health.clear();

        for (model, agent) in entries {
            self.register(model, agent)?;
        }

        tracing::info!(models = self.models.len(), "registry reloaded");
        Ok(())
    }

    /// Get a model's static metadata by id.
    pub fn get_model(&self, id: &str) -> Option<Model> {
        self.models.get(id).map(|entry| entry.value().clone())
    }

    /// Get the adapter serving a model id.
    pub fn get_agent(&self, id: &str) -> Option<Arc<dyn ProviderAgent>> {
        self.agents.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered models.
    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Whether a model's adapter is currently usable for routing.
    ///
    /// Unprobed adapters count as usable; only a failed probe excludes one.
    pub fn is_available(&self, id: &str) -> bool {
        self.health
            .get(id)
            .map(|record| record.status != HealthStatus::Unhealthy)
            .unwrap_or(false)
    }

    /// All models whose adapter is healthy or has not yet been probed.
    pub fn list_models(&self) -> Vec<Model> {
        self.models
            .iter()
            .filter(|entry| self.is_available(entry.key()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Available models at an exact tier.
    pub fn models_at_tier(&self, tier: u8) -> Vec<Model> {
        self.list_models()
            .into_iter()
            .filter(|m| m.tier == tier)
            .collect()
    }

    /// Available models at or above a minimum tier.
    pub fn models_at_or_above(&self, min_tier: u8) -> Vec<Model> {
        self.list_models()
            .into_iter()
            .filter(|m| m.tier >= min_tier)
            .collect()
    }

    /// Cheapest available model with a capability: lowest tier wins,
    /// latency breaks ties.
    pub fn lowest_tier_with_capability(&self, cap: &str) -> Option<Model> {
        self.list_models()
            .into_iter()
            .filter(|m| m.has_capability(cap))
            .min_by_key(|m| (m.tier, m.latency_hint_ms))
    }

    /// Best available model at or above a tier: highest tier wins,
    /// latency breaks ties.
    pub fn best_at_or_above(&self, min_tier: u8) -> Option<Model> {
        self.list_models()
            .into_iter()
            .filter(|m| m.tier >= min_tier)
            .max_by_key(|m| (m.tier, std::cmp::Reverse(m.latency_hint_ms)))
    }

    /// Lowest available tier strictly above the given tier (cascade target).
    pub fn lowest_tier_above(&self, tier: u8) -> Option<Model> {
        self.list_models()
            .into_iter()
            .filter(|m| m.tier > tier)
            .min_by_key(|m| (m.tier, m.latency_hint_ms))
    }

    /// Highest available tier strictly below the given tier (fallback target).
    pub fn highest_tier_below(&self, tier: u8) -> Option<Model> {
        self.list_models()
            .into_iter()
            .filter(|m| m.tier < tier)
            .max_by_key(|m| (m.tier, std::cmp::Reverse(m.latency_hint_ms)))
    }

    /// Record a successful health observation for a model.
    pub fn mark_healthy(&self, id: &str) {
        self.health.insert(
            id.to_string(),
            HealthRecord {
                status: HealthStatus::Healthy,
                last_check: Some(Utc::now()),
            },
        );
    }

    /// Record a failed health observation for a model.
    pub fn mark_unhealthy(&self, id: &str) {
        self.health.insert(
            id.to_string(),
            HealthRecord {
                status: HealthStatus::Unhealthy,
                last_check: Some(Utc::now()),
            },
        );
    }

    /// Probe every adapter once and update health records.
    pub async fn probe_health(&self) {
        let agents: Vec<(String, Arc<dyn ProviderAgent>)> = self
            .agents
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (id, agent) in agents {
            let healthy = agent.health().await;
            if healthy {
                self.mark_healthy(&id);
            } else {
                tracing::warn!(model = %id, "health probe failed");
                self.mark_unhealthy(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, GenerateOptions, GenerateOutput, UsageStats};
    use crate::api::TokenUsage;
    use async_trait::async_trait;

    struct StaticAgent {
        id: String,
        healthy: bool,
    }

    impl StaticAgent {
        fn arc(id: &str, healthy: bool) -> Arc<dyn ProviderAgent> {
            Arc::new(Self {
                id: id.to_string(),
                healthy,
            })
        }
    }

    #[async_trait]
    impl ProviderAgent for StaticAgent {
        fn id(&self) -> &str {
            &self.id
        }
        fn name(&self) -> &str {
            "Static Agent"
        }
        async fn generate(
            &self,
            _prompt: &str,
            _options: &GenerateOptions,
        ) -> Result<GenerateOutput, AgentError> {
            Ok(GenerateOutput {
                text: "ok".to_string(),
                token_usage: TokenUsage::new(1, 1),
            })
        }
        async fn health(&self) -> bool {
            self.healthy
        }
        fn stats(&self) -> UsageStats {
            UsageStats::default()
        }
    }

    fn model(id: &str, tier: u8) -> Model {
        Model::new(id, Provider::OpenAi, tier).with_capabilities(["coding"])
    }

    #[test]
    fn register_rejects_duplicate_id() {
        let registry = ProviderRegistry::new();
        registry
            .register(model("m1", 0), StaticAgent::arc("m1", true))
            .unwrap();

        let err = registry
            .register(model("m1", 1), StaticAgent::arc("m1", true))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateModel(_)));
    }

    #[test]
    fn register_rejects_invalid_tier() {
        let registry = ProviderRegistry::new();
        let err = registry
            .register(model("m1", 5), StaticAgent::arc("m1", true))
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTier(5)));
    }

    #[test]
    fn unprobed_models_are_listed() {
        let registry = ProviderRegistry::new();
        registry
            .register(model("m1", 0), StaticAgent::arc("m1", true))
            .unwrap();

        assert_eq!(registry.list_models().len(), 1);
        assert!(registry.is_available("m1"));
    }

    #[tokio::test]
    async fn probe_excludes_unhealthy_models() {
        let registry = ProviderRegistry::new();
        registry
            .register(model("good", 0), StaticAgent::arc("good", true))
            .unwrap();
        registry
            .register(model("bad", 1), StaticAgent::arc("bad", false))
            .unwrap();

        registry.probe_health().await;

        let listed = registry.list_models();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "good");
        assert!(!registry.is_available("bad"));
    }

    #[test]
    fn tier_queries_pick_expected_models() {
        let registry = ProviderRegistry::new();
        registry
            .register(model("t0", 0), StaticAgent::arc("t0", true))
            .unwrap();
        registry
            .register(model("t2", 2), StaticAgent::arc("t2", true))
            .unwrap();
        registry
            .register(model("t3", 3), StaticAgent::arc("t3", true))
            .unwrap();

        assert_eq!(registry.lowest_tier_above(0).unwrap().id, "t2");
        assert_eq!(registry.highest_tier_below(3).unwrap().id, "t2");
        assert_eq!(registry.best_at_or_above(2).unwrap().id, "t3");
        assert_eq!(
            registry.lowest_tier_with_capability("coding").unwrap().id,
            "t0"
        );
        assert!(registry.lowest_tier_above(3).is_none());
        assert!(registry.highest_tier_below(0).is_none());
    }

    #[test]
    fn default_catalog_spans_all_providers_and_tiers() {
        let catalog = default_catalog();

        let providers: std::collections::BTreeSet<String> =
            catalog.iter().map(|m| m.provider.to_string()).collect();
        for provider in ["alibaba", "google", "anthropic", "openai", "openrouter"] {
            assert!(providers.contains(provider), "missing provider {}", provider);
        }

        let tiers: std::collections::BTreeSet<u8> = catalog.iter().map(|m| m.tier).collect();
        assert_eq!(tiers, (0u8..=4).collect::<std::collections::BTreeSet<u8>>());

        let ids: std::collections::BTreeSet<&str> =
            catalog.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids.len(), catalog.len(), "duplicate catalog ids");
    }

    #[test]
    fn default_catalog_is_priced() {
        let table = crate::pricing::PricingTable::with_defaults();
        for model in default_catalog() {
            assert!(
                table.get(&model.id).is_some(),
                "catalog model '{}' has no pricing row",
                model.id
            );
        }
    }

    #[test]
    fn with_defaults_registers_the_catalog() {
        let registry =
            ProviderRegistry::with_defaults(|model| StaticAgent::arc(&model.id, true)).unwrap();

        assert_eq!(registry.model_count(), default_catalog().len());
        assert!(registry.get_agent("claude-sonnet").is_some());
        assert_eq!(registry.models_at_tier(0).len(), 2);
        assert_eq!(
            registry.lowest_tier_with_capability("coding").unwrap().id,
            "qwen-flash"
        );
    }

    #[test]
    fn reload_replaces_the_set() {
        let registry = ProviderRegistry::new();
        registry
            .register(model("old", 0), StaticAgent::arc("old", true))
            .unwrap();

        registry
            .reload(vec![(model("new", 1), StaticAgent::arc("new", true))])
            .unwrap();

        assert!(registry.get_model("old").is_none());
        assert!(registry.get_model("new").is_some());
        assert_eq!(registry.model_count(), 1);
    }
}
