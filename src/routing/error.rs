//! Error types for routing failures

use crate::api::ErrorCode;
use thiserror::Error;

/// Errors that can occur during model selection
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No registered model satisfies the tier and health constraints
    #[error("No model available for task '{task}'")]
    NoCandidate { task: String },

    /// Every candidate (including lower-tier fallbacks) was denied by budget
    #[error("Budget denied all candidates: {reason}")]
    BudgetDenied { reason: String },

    /// The task type string could not be parsed
    #[error("Invalid task type '{0}'")]
    InvalidTaskType(String),
}

impl RoutingError {
    /// Map the routing failure to the public response error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RoutingError::NoCandidate { .. } => ErrorCode::ModelUnavailable,
            RoutingError::BudgetDenied { .. } => ErrorCode::BudgetExceeded,
            RoutingError::InvalidTaskType(_) => ErrorCode::InvalidTaskType,
        }
    }
}
