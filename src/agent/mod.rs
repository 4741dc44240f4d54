//! Provider adapter abstraction layer.
//!
//! This module provides the `ProviderAgent` trait and supporting types that
//! abstract provider-specific logic for generation, health checking, and
//! lifetime statistics. Concrete SDK adapters live outside this crate; the
//! core routes against this contract only.

use async_trait::async_trait;

pub mod error;
pub mod types;

pub use error::AgentError;
pub use types::{AgentCounters, GenerateOptions, GenerateOutput, UsageStats};

/// Unified interface for all LLM provider backends.
///
/// Encapsulates provider-specific wire protocols, response parsing, and
/// credential handling. Enables uniform routing without type branching.
///
/// # Object Safety
///
/// This trait is object-safe and designed to be used as `Arc<dyn ProviderAgent>`.
/// All async methods use `async_trait` for compatibility with trait objects.
///
/// # Cancellation Safety
///
/// `generate` must be cancellation-safe: dropping the future aborts any
/// in-flight provider call and cleans up resources.
#[async_trait]
pub trait ProviderAgent: Send + Sync + 'static {
    /// The model id this adapter serves (unique in the registry).
    fn id(&self) -> &str;

    /// Human-readable name for logging (e.g., "Anthropic claude-sonnet").
    fn name(&self) -> &str;

    /// Execute a generate call against the provider.
    ///
    /// # Returns
    ///
    /// - `Ok(GenerateOutput)` on success, with provider-reported token usage
    /// - `Err(AgentError::Timeout)` if the call exceeded `options.timeout`
    /// - `Err(AgentError::RateLimited)` if the provider throttled the call
    /// - `Err(AgentError::Upstream)` if the provider returned 4xx/5xx
    /// - `Err(AgentError::Network)` if the provider was unreachable
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<GenerateOutput, AgentError>;

    /// Check provider health. Must be cheap; may return a cached value.
    async fn health(&self) -> bool;

    /// Lifetime usage totals for the life of the process.
    fn stats(&self) -> UsageStats;
}
