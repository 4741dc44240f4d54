//! Shared test agents and fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata::agent::{AgentCounters, AgentError, GenerateOptions, GenerateOutput, ProviderAgent, UsageStats};
use strata::api::TokenUsage;

/// Agent that always answers with a fixed text and usage.
pub struct CannedAgent {
    id: String,
    text: String,
    usage: TokenUsage,
    delay: Option<Duration>,
    calls: AtomicU64,
    counters: AgentCounters,
}

impl CannedAgent {
    pub fn new(id: &str, text: &str, usage: TokenUsage) -> Self {
        Self {
            id: id.to_string(),
            text: text.to_string(),
            usage,
            delay: None,
            calls: AtomicU64::new(0),
            counters: AgentCounters::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProviderAgent for CannedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Canned Agent"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<GenerateOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.counters.record(true, self.usage.total, 5);
        Ok(GenerateOutput {
            text: self.text.clone(),
            token_usage: self.usage,
        })
    }

    async fn health(&self) -> bool {
        true
    }

    fn stats(&self) -> UsageStats {
        self.counters.snapshot()
    }
}

/// Coding agent for collaborative tests.
///
/// Echoes the subtask description into a comment so requirement coverage
/// holds. When poisoned, the first attempt at each subtask returns code
/// containing `eval(`; the revision attempt (recognized by the review
/// feedback marker in the prompt) returns clean code.
pub struct SubtaskCoder {
    id: String,
    poison_first_attempt: bool,
    calls: AtomicU64,
    counters: AgentCounters,
}

impl SubtaskCoder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            poison_first_attempt: false,
            calls: AtomicU64::new(0),
            counters: AgentCounters::new(),
        }
    }

    pub fn poisoned(id: &str) -> Self {
        Self {
            poison_first_attempt: true,
            ..Self::new(id)
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ProviderAgent for SubtaskCoder {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        "Subtask Coder"
    }

    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<GenerateOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let subtask_line = prompt
            .lines()
            .find(|line| line.starts_with("Subtask:"))
            .map(|line| line.trim_start_matches("Subtask:").trim().to_string())
            .unwrap_or_else(|| "the requested work".to_string());
        let is_revision = prompt.contains("rejected in review");

        let code = if self.poison_first_attempt && !is_revision {
            format!(
                "// {}\nfunction run(input) {{ return eval(input); }}",
                subtask_line
            )
        } else {
            format!(
                "// {}\nfunction handler(req, res) {{\n  try {{\n    return res.json({{ ok: true }});\n  }} catch (err) {{\n    return res.status(500).json({{ error: String(err) }});\n  }}\n}}",
                subtask_line
            )
        };

        let text = format!("Implementation below.\n```javascript\n{}\n```\nDone.", code);
        let usage = TokenUsage::new((prompt.len() / 4) as u32, (text.len() / 4) as u32);
        self.counters.record(true, usage.total, 8);
        Ok(GenerateOutput {
            text,
            token_usage: usage,
        })
    }

    async fn health(&self) -> bool {
        true
    }

    fn stats(&self) -> UsageStats {
        self.counters.snapshot()
    }
}
