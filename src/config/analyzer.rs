//! Query analyzer configuration

use serde::{Deserialize, Serialize};

/// Tunable knobs for the query analyzer heuristics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalyzerConfig {
    /// Ceiling applied to the estimated output token count
    pub max_output_tokens: u32,

    /// Context escalation factor above which the task type is bumped a level
    pub escalation_bump_factor: f64,

    /// Additive priority shift applied when a cue family matches
    pub priority_cue_boost: f64,

    /// Additive priority shift applied to the other two axes on a cue match
    pub priority_cue_damp: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_output_tokens: 8_192,
            escalation_bump_factor: 1.5,
            priority_cue_boost: 0.3,
            priority_cue_damp: 0.1,
        }
    }
}

impl AnalyzerConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.max_output_tokens == 0 {
            return Err("max_output_tokens must be > 0".to_string());
        }

        if self.escalation_bump_factor <= 0.0 {
            return Err("escalation_bump_factor must be > 0.0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_defaults_are_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_output_tokens, 8_192);
        assert_eq!(config.escalation_bump_factor, 1.5);
    }

    #[test]
    fn rejects_zero_ceiling() {
        let config = AnalyzerConfig {
            max_output_tokens: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
