//! Logging configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Pretty-printed logs for humans
    #[default]
    Pretty,
    /// JSON logs for machine parsing
    Json,
}

/// Subsystems that accept their own log level. Anything else in the
/// `components` table is rejected at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogComponent {
    Analyzer,
    Budget,
    Collab,
    Quality,
    Registry,
    Routing,
}

impl LogComponent {
    /// Module path the tracing filter targets.
    pub fn target(self) -> &'static str {
        match self {
            LogComponent::Analyzer => "strata::analyzer",
            LogComponent::Budget => "strata::budget",
            LogComponent::Collab => "strata::collab",
            LogComponent::Quality => "strata::quality",
            LogComponent::Registry => "strata::registry",
            LogComponent::Routing => "strata::routing",
        }
    }
}

const KNOWN_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Base level for the whole crate
    pub level: String,

    pub format: LogFormat,

    /// Per-subsystem level overrides, e.g. `routing = "debug"`
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<LogComponent, String>,

    /// Emit prompt and response text at debug level. Off by default:
    /// request content can carry credentials and user data.
    pub log_prompt_content: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            components: BTreeMap::new(),
            log_prompt_content: false,
        }
    }
}

impl LoggingConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if !KNOWN_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(format!("unknown log level '{}'", self.level));
        }

        for (component, level) in &self.components {
            if !KNOWN_LEVELS.contains(&level.to_lowercase().as_str()) {
                return Err(format!(
                    "unknown log level '{}' for component {:?}",
                    level, component
                ));
            }
        }

        Ok(())
    }
}
