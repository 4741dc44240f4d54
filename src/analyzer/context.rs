//! Conversation context passed into the analyzer.
//!
//! Replaces ambient conversation-manager state with an explicit value: the
//! analyzer stays stateless and deterministic for a given (prompt, context).

use super::Complexity;
use serde::{Deserialize, Serialize};

/// Summary of one earlier turn in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousTurn {
    pub complexity: Complexity,
    pub model_id: String,
    pub success: bool,
    /// Domain tags observed on that turn
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Multi-turn context consumed by `QueryAnalyzer::analyze`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub previous_turns: Vec<PreviousTurn>,
    pub turn_count: u32,
    pub current_complexity_level: Complexity,
}

impl ConversationContext {
    /// Multiplier applied to the derived task difficulty.
    ///
    /// Grows with turn depth, with the running complexity level, and with
    /// recent failed turns (a struggling model is a signal to escalate).
    pub fn escalation_factor(&self) -> f64 {
        let mut factor = 1.0;

        factor += 0.04 * f64::from(self.turn_count.min(10));

        factor += match self.current_complexity_level {
            Complexity::Trivial | Complexity::Simple => 0.0,
            Complexity::Moderate => 0.15,
            Complexity::Complex => 0.3,
            Complexity::Expert => 0.45,
        };

        let recent_failures = self
            .previous_turns
            .iter()
            .rev()
            .take(3)
            .filter(|t| !t.success)
            .count();
        factor += 0.1 * recent_failures as f64;

        factor
    }

    /// Domains seen on the most recent turn, for topic-shift detection.
    pub fn last_domains(&self) -> &[String] {
        self.previous_turns
            .last()
            .map(|t| t.domains.as_slice())
            .unwrap_or(&[])
    }

    /// Fraction of recent turns that succeeded (1.0 with no history).
    pub fn model_performance_factor(&self) -> f64 {
        let recent: Vec<&PreviousTurn> = self.previous_turns.iter().rev().take(5).collect();
        if recent.is_empty() {
            return 1.0;
        }
        recent.iter().filter(|t| t.success).count() as f64 / recent.len() as f64
    }
}
