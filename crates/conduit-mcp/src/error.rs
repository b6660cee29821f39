//! Error types for MCP operations.
//!
//! Only failures that prevent a reply from arriving at all live here. A server
//! that answers with a JSON-RPC `error` member is not an [`McpError`]; see
//! [`RpcOutcome`](crate::codec::RpcOutcome).

use thiserror::Error;

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;

/// Error type for MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Failed to reach the MCP server (connection refused, DNS, TLS...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success HTTP status.
    #[error("HTTP error {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// Timeout waiting for response.
    #[error("timeout waiting for response")]
    Timeout,

    /// The server rejected the session identifier; `initialize` must be re-run.
    #[error("session '{session_id}' rejected by server - re-initialize required")]
    SessionExpired {
        /// The identifier the server refused.
        session_id: String,
    },

    /// Invalid client-side configuration (bad URL, bad header).
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response where one was not tolerated.
    #[error("server error {code}: {message}")]
    ServerError {
        /// Error code from the server.
        code: i64,
        /// Error message from the server.
        message: String,
        /// Optional additional data.
        data: Option<serde_json::Value>,
    },

    /// The approval collaborator failed to produce a decision.
    #[error("approval error: {0}")]
    Approval(String),
}

impl McpError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a server error from an error response.
    pub fn server_error(
        code: i64,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
            data,
        }
    }

    /// Create an approval error.
    pub fn approval(msg: impl Into<String>) -> Self {
        Self::Approval(msg.into())
    }

    /// Whether this error means the session must be re-initialized.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }
}

impl From<reqwest::Error> for McpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}
