//! Configuration module for Strata
//!
//! Provides layered configuration loading from files, environment variables,
//! and defaults. Every sub-config validates at startup; unknown keys are
//! rejected at parse time.

pub mod analyzer;
pub mod budget;
pub mod collaboration;
pub mod error;
pub mod logging;
pub mod routing;

pub use analyzer::AnalyzerConfig;
pub use budget::BudgetConfig;
pub use collaboration::{CollaborationConfig, QcDepth};
pub use error::ConfigError;
pub use logging::{LogComponent, LogFormat, LoggingConfig};
pub use routing::{RoutingConfig, TaskRule};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration struct that holds all sub-configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct StrataConfig {
    pub budget: BudgetConfig,
    pub collaboration: CollaborationConfig,
    pub routing: RoutingConfig,
    pub analyzer: AnalyzerConfig,
    pub logging: LoggingConfig,
}

impl StrataConfig {
    /// Load configuration from a TOML file.
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supports STRATA_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(budget) = std::env::var("STRATA_MONTHLY_BUDGET") {
            if let Ok(value) = budget.parse::<f64>() {
                self.budget.monthly_budget = value;
            }
        }

        if let Ok(tier) = std::env::var("STRATA_DEFAULT_TIER") {
            if let Ok(value) = tier.parse::<u8>() {
                self.routing.default_tier = value;
            }
        }

        if let Ok(timeout) = std::env::var("STRATA_TIMEOUT_MS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.routing.timeout_ms = value;
            }
        }

        if let Ok(level) = std::env::var("STRATA_LOG_LEVEL") {
            self.logging.level = level;
        }

        self
    }

    /// Validate all sub-configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.budget
            .validate()
            .map_err(|m| ConfigError::invalid("budget", m))?;
        self.collaboration
            .validate()
            .map_err(|m| ConfigError::invalid("collaboration", m))?;
        self.routing
            .validate()
            .map_err(|m| ConfigError::invalid("routing", m))?;
        self.analyzer
            .validate()
            .map_err(|m| ConfigError::invalid("analyzer", m))?;
        self.logging
            .validate()
            .map_err(|m| ConfigError::invalid("logging", m))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = StrataConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_none_returns_defaults() {
        let config = StrataConfig::load(None).unwrap();
        assert_eq!(config.budget.monthly_budget, 100.0);
        assert_eq!(config.routing.default_tier, 1);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let result = StrataConfig::load(Some(Path::new("/nonexistent/strata.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn parse_rejects_unknown_top_level_key() {
        let result: Result<StrataConfig, _> = toml::from_str("[server]\nport = 8080\n");
        assert!(result.is_err());
    }

    #[test]
    fn parse_partial_config_keeps_defaults() {
        let config: StrataConfig = toml::from_str(
            "[budget]\nmonthly_budget = 70.0\n\n[routing]\ndefault_tier = 0\n",
        )
        .unwrap();
        assert_eq!(config.budget.monthly_budget, 70.0);
        assert_eq!(config.routing.default_tier, 0);
        // untouched sections keep defaults
        assert_eq!(config.collaboration.max_retries, 2);
        assert_eq!(config.budget.warning_threshold, 0.8);
    }
}
