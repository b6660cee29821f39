//! LLM backend trait and a scripted mock.
//!
//! Backends are blocking: one call, one reply. The conversation loop never has
//! more than one request in flight.

use std::sync::Arc;

use crate::error::Result;
use crate::types::{LlmReply, Message, ToolDefinition};

/// A chat-completion provider with function calling.
pub trait LlmBackend: Send + Sync {
    /// Complete the conversation, offering `tools` to the model.
    fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply>;

    /// Name of this backend, for logs.
    fn name(&self) -> &str;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockBackend, MockRequest};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::collections::VecDeque;

    use parking_lot::Mutex;

    use super::LlmBackend;
    use crate::error::{AgentError, Result};
    use crate::types::{LlmReply, Message, ToolDefinition};

    /// What a [`MockBackend`] was asked.
    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub messages: Vec<Message>,
        pub tool_names: Vec<String>,
    }

    /// Mock LLM backend for testing.
    ///
    /// Replies are returned in order. Once the script runs out, the fallback
    /// reply is repeated if one was set; otherwise the call fails.
    pub struct MockBackend {
        replies: Mutex<VecDeque<LlmReply>>,
        fallback: Option<LlmReply>,
        request_log: Mutex<Vec<MockRequest>>,
    }

    impl MockBackend {
        /// Create a mock backend with the given replies.
        pub fn new(replies: Vec<LlmReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fallback: None,
                request_log: Mutex::new(Vec::new()),
            }
        }

        /// Create a mock backend with a single text reply.
        pub fn with_text(text: impl Into<String>) -> Self {
            Self::new(vec![LlmReply::text(text)])
        }

        /// Create a mock backend that gives the same reply forever.
        pub fn repeating(reply: LlmReply) -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                fallback: Some(reply),
                request_log: Mutex::new(Vec::new()),
            }
        }

        /// Get all requests that were made to this backend.
        pub fn requests(&self) -> Vec<MockRequest> {
            self.request_log.lock().clone()
        }

        /// Get the number of requests made.
        pub fn request_count(&self) -> usize {
            self.request_log.lock().len()
        }
    }

    impl LlmBackend for MockBackend {
        fn complete(&self, messages: &[Message], tools: &[ToolDefinition]) -> Result<LlmReply> {
            self.request_log.lock().push(MockRequest {
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });

            if let Some(reply) = self.replies.lock().pop_front() {
                return Ok(reply);
            }
            self.fallback
                .clone()
                .ok_or_else(|| AgentError::backend("MockBackend: no more responses available"))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use crate::types::PendingToolCall;

    #[test]
    fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");
        let reply = backend.complete(&[Message::user("Hi")], &[]).unwrap();
        assert_eq!(reply.text.as_deref(), Some("Hello!"));
        assert_eq!(backend.request_count(), 1);
    }

    #[test]
    fn test_mock_backend_exhausted() {
        let backend = MockBackend::new(vec![]);
        let err = backend.complete(&[Message::user("Hi")], &[]).unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
    }

    #[test]
    fn test_mock_backend_repeating() {
        let reply = LlmReply::calls(vec![PendingToolCall::new("c1", "ping", "{}")]);
        let backend = MockBackend::repeating(reply.clone());
        for _ in 0..3 {
            assert_eq!(backend.complete(&[], &[]).unwrap(), reply);
        }
        assert_eq!(backend.request_count(), 3);
    }

    #[test]
    fn test_shared_backend() {
        let backend: SharedBackend = Arc::new(MockBackend::with_text("ok"));
        assert_eq!(backend.name(), "mock");
    }
}
