//! Error types for the LLM crate.

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// API error reported by the provider.
    #[error("{provider} API error (status {status}): {message}")]
    Api {
        /// Provider name (e.g. "openai").
        provider: String,
        /// HTTP status code.
        status: u16,
        /// Error message from the provider.
        message: String,
    },

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Role label the provider does not accept.
    #[error("invalid role '{role}' for provider '{provider}'")]
    InvalidRole {
        /// The rejected role label.
        role: String,
        /// Provider name.
        provider: String,
    },

    /// Tool choice value the provider does not accept.
    #[error("unsupported tool_choice '{choice}' for provider '{provider}'")]
    UnsupportedToolChoice {
        /// The rejected tool choice.
        choice: String,
        /// Provider name.
        provider: String,
    },

    /// Tool call payload that could not be decoded.
    #[error("malformed tool call: {0}")]
    MalformedToolCall(String),

    /// Response body that does not match the provider's documented shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Returns true if this error is retryable.
    ///
    /// Network errors and rate limit errors are retryable. Configuration,
    /// serialization, and contract errors should not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(LlmError::Network("timeout".to_string()).is_retryable());
        assert!(LlmError::RateLimit("slow down".to_string()).is_retryable());
        assert!(!LlmError::Config("bad config".to_string()).is_retryable());
        assert!(!LlmError::Auth("unauthorized".to_string()).is_retryable());
        assert!(
            !LlmError::Api {
                provider: "openai".to_string(),
                status: 500,
                message: "server error".to_string(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_error_display() {
        let err = LlmError::UnsupportedToolChoice {
            choice: "any".to_string(),
            provider: "ollama".to_string(),
        };
        assert!(err.to_string().contains("any"));
        assert!(err.to_string().contains("ollama"));

        let err = LlmError::InvalidRole {
            role: "narrator".to_string(),
            provider: "anthropic".to_string(),
        };
        assert!(err.to_string().contains("narrator"));
    }
}
