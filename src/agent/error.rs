//! Error types for provider adapter operations.

use thiserror::Error;

/// Errors that can occur during provider adapter operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Network connectivity error (DNS, connection refused, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded deadline.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Provider rejected the request due to rate limiting.
    #[error("Rate limit exceeded (retry_after_ms: {retry_after_ms:?})")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Provider returned an error response (4xx, 5xx).
    #[error("Provider error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Provider credentials are missing or invalid.
    #[error("API key missing for provider '{0}'")]
    MissingApiKey(String),

    /// Method not supported by this adapter implementation.
    #[error("Method '{0}' not supported by this adapter")]
    Unsupported(&'static str),

    /// Provider response doesn't match the expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Adapter configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl AgentError {
    /// Map the adapter error to the public response error code.
    pub fn error_code(&self) -> crate::api::ErrorCode {
        use crate::api::ErrorCode;
        match self {
            AgentError::Timeout(_) => ErrorCode::Timeout,
            AgentError::RateLimited { .. } => ErrorCode::RateLimitExceeded,
            AgentError::MissingApiKey(_) => ErrorCode::ApiKeyMissing,
            AgentError::Unsupported(_) => ErrorCode::CapabilityError,
            AgentError::Network(_)
            | AgentError::Upstream { .. }
            | AgentError::InvalidResponse(_)
            | AgentError::Configuration(_) => ErrorCode::GenerationError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorCode;

    #[test]
    fn error_codes_map_to_taxonomy() {
        assert_eq!(AgentError::Timeout(30_000).error_code(), ErrorCode::Timeout);
        assert_eq!(
            AgentError::RateLimited {
                retry_after_ms: None
            }
            .error_code(),
            ErrorCode::RateLimitExceeded
        );
        assert_eq!(
            AgentError::MissingApiKey("openai".into()).error_code(),
            ErrorCode::ApiKeyMissing
        );
        assert_eq!(
            AgentError::Network("connection refused".into()).error_code(),
            ErrorCode::GenerationError
        );
    }

    #[test]
    fn rate_limited_display_includes_retry_hint() {
        let err = AgentError::RateLimited {
            retry_after_ms: Some(1500),
        };
        assert!(err.to_string().contains("1500"));
    }
}
