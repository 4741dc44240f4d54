//! Collaborative coding pipeline configuration

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Depth of the per-subtask quality check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QcDepth {
    /// Mechanical checks only
    Quick,
    /// Mechanical checks plus delegated analyzer review
    #[default]
    Full,
}

impl FromStr for QcDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quick" => Ok(QcDepth::Quick),
            "full" => Ok(QcDepth::Full),
            _ => Err(format!("Invalid qc_depth: {}", s)),
        }
    }
}

/// Knobs for the collaborative pipeline and post-response quality control.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollaborationConfig {
    /// Re-execute on a higher tier when a response fails quality
    pub cascade_enabled: bool,

    /// Improve passing responses on a higher tier
    pub refinement_enabled: bool,

    /// Allow independent easy subtasks to run concurrently
    pub parallel_enabled: bool,

    /// Difficulty score fraction (0-1) above which a subtask is hard
    pub difficulty_threshold: f64,

    /// Maximum gate-driven retries per subtask
    pub max_retries: u32,

    /// Quality check depth
    pub qc_depth: QcDepth,

    /// Maximum subtasks a decomposition may produce
    pub max_subtasks: usize,

    /// Upgrade a subtask to hard after this many adapter-error retries
    pub auto_escalate_after_retries: u32,

    /// Minimum gate score (0-100) for a review to pass
    pub min_score: f64,

    /// Gate score (0-100) below which revision is required
    pub requires_review: f64,

    /// Responses shorter than this many chars trigger cascade
    pub min_response_length: usize,

    /// Analysis confidence below this triggers cascade
    pub min_confidence: f64,

    /// Blend weight of the heuristic score vs a delegated subtask analyzer
    pub heuristic_mix: f64,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            cascade_enabled: true,
            refinement_enabled: false,
            parallel_enabled: false,
            difficulty_threshold: 0.5,
            max_retries: 2,
            qc_depth: QcDepth::Full,
            max_subtasks: 10,
            auto_escalate_after_retries: 1,
            min_score: 70.0,
            requires_review: 60.0,
            min_response_length: 20,
            min_confidence: 0.3,
            heuristic_mix: 0.7,
        }
    }
}

impl CollaborationConfig {
    /// Validate configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.difficulty_threshold) {
            return Err("difficulty_threshold must be in 0.0-1.0".to_string());
        }

        if self.max_subtasks == 0 {
            return Err("max_subtasks must be >= 1".to_string());
        }

        if !(0.0..=100.0).contains(&self.min_score) {
            return Err("min_score must be in 0-100".to_string());
        }

        if !(0.0..=100.0).contains(&self.requires_review) {
            return Err("requires_review must be in 0-100".to_string());
        }

        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err("min_confidence must be in 0.0-1.0".to_string());
        }

        if !(0.0..=1.0).contains(&self.heuristic_mix) {
            return Err("heuristic_mix must be in 0.0-1.0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaboration_defaults_are_valid() {
        let config = CollaborationConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.cascade_enabled);
        assert!(!config.refinement_enabled);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.max_subtasks, 10);
        assert_eq!(config.qc_depth, QcDepth::Full);
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let config = CollaborationConfig {
            difficulty_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_max_subtasks() {
        let config = CollaborationConfig {
            max_subtasks: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn qc_depth_from_str() {
        assert_eq!(QcDepth::from_str("quick").unwrap(), QcDepth::Quick);
        assert_eq!(QcDepth::from_str("FULL").unwrap(), QcDepth::Full);
        assert!(QcDepth::from_str("deep").is_err());
    }
}
