//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
///
/// Anything here aborts the current turn. Tool-level failures reported by the
/// server are not errors; they go back to the LLM as tool messages.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The MCP server could not be reached, or rejected the session.
    #[error("MCP error: {0}")]
    Mcp(#[from] conduit_mcp::McpError),

    /// Backend/API error from the LLM provider.
    #[error("LLM backend error: {0}")]
    Backend(String),

    /// Network/connectivity error talking to the LLM provider.
    #[error("LLM network error: {0}")]
    Network(String),

    /// The LLM call timed out.
    #[error("LLM request timed out")]
    Timeout,

    /// Authentication with the LLM provider failed.
    #[error("LLM authentication error: {0}")]
    Auth(String),

    /// The provider is throttling us.
    #[error("LLM rate limit exceeded: {0}")]
    RateLimit(String),

    /// Configuration error (API key missing, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Interaction store failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Whether retrying the same LLM request might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() || e.is_request() {
            Self::Network(e.to_string())
        } else {
            Self::Backend(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::backend("model overloaded");
        assert_eq!(err.to_string(), "LLM backend error: model overloaded");

        let err = AgentError::config("OPENAI_API_KEY not set");
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_retryable() {
        assert!(AgentError::Network("reset".into()).is_retryable());
        assert!(AgentError::RateLimit("slow down".into()).is_retryable());
        assert!(!AgentError::Auth("bad key".into()).is_retryable());
        assert!(!AgentError::Timeout.is_retryable());
    }

    #[test]
    fn test_from_mcp_error() {
        let err: AgentError = conduit_mcp::McpError::Timeout.into();
        assert!(matches!(err, AgentError::Mcp(_)));
    }
}
