//! Error types for OpenAI client.

use thiserror::Error;

/// Result type for OpenAI client operations.
pub type Result<T> = std::result::Result<T, OpenAIError>;

/// OpenAI client errors.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection refused, reset, DNS)
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within its deadline
    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    /// API error (non-2xx response, rate limit, invalid request)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl OpenAIError {
    /// Whether retrying the same request may succeed.
    ///
    /// Transport failures, timeouts, rate limits and server errors are
    /// transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            OpenAIError::Network(_) | OpenAIError::Timeout(_) => true,
            OpenAIError::Api { status, .. } => *status == 429 || *status >= 500,
            OpenAIError::Config(_) | OpenAIError::Parse(_) => false,
        }
    }

    /// HTTP status of an API error.
    pub fn status(&self) -> Option<u16> {
        match self {
            OpenAIError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
