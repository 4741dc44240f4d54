//! Error types for the provider registry

use thiserror::Error;

/// Errors raised while mutating the registry
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A model with the same id is already registered
    #[error("Model '{0}' is already registered")]
    DuplicateModel(String),

    /// The requested model is not registered
    #[error("Model '{0}' not found")]
    ModelNotFound(String),

    /// Tier outside the 0-4 range
    #[error("Tier {0} out of range 0-4")]
    InvalidTier(u8),
}
