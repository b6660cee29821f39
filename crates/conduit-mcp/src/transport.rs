//! Transport layer for MCP communication.
//!
//! MCP's streamable HTTP binding is a single endpoint receiving JSON-RPC over
//! HTTP POST. [`HttpTransport`] is the real implementation. With the `testing`
//! feature, `MockTransport` answers from a closure and records every request.

use std::time::Duration;

use crate::error::{McpError, Result};
use crate::protocol::SESSION_HEADER;

/// Configuration for HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// URL of the MCP endpoint.
    pub url: String,
    /// Request timeout. Always finite.
    pub timeout: Duration,
    /// Number of retries for requests that failed to connect.
    pub retries: u32,
    /// Extra static headers (authentication and the like).
    pub headers: Vec<(String, String)>,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout: Duration::from_secs(30),
            retries: 3,
            headers: Vec::new(),
        }
    }
}

impl HttpTransportConfig {
    /// Create a new HTTP transport config with the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// A successful (2xx) HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct TransportReply {
    /// Value of the `mcp-session-id` response header, if present.
    pub session_id: Option<String>,
    /// Raw response body (JSON or SSE text).
    pub body: String,
}

impl TransportReply {
    /// A reply with the given body and no session header.
    pub fn body(body: impl Into<String>) -> Self {
        Self {
            session_id: None,
            body: body.into(),
        }
    }

    /// Attach a session header.
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Something that can carry one JSON-RPC message to the server and return the
/// raw reply.
///
/// Non-2xx statuses are reported as [`McpError::Http`].
pub trait Transport: Send + Sync {
    /// POST `body` with `headers` and wait for the reply.
    fn post(&self, body: &str, headers: &[(String, String)]) -> Result<TransportReply>;

    /// Human-readable endpoint, for logs.
    fn endpoint(&self) -> &str;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Blocking HTTP transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport.
    pub fn connect(config: HttpTransportConfig) -> Result<Self> {
        url::Url::parse(&config.url)
            .map_err(|e| McpError::config(format!("invalid URL '{}': {}", config.url, e)))?;

        if config.timeout.is_zero() {
            return Err(McpError::config("timeout must be greater than zero"));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            url = %config.url,
            timeout_secs = config.timeout.as_secs(),
            "created HTTP transport"
        );

        Ok(Self { client, config })
    }

    /// The transport configuration.
    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }
}

impl Transport for HttpTransport {
    fn post(&self, body: &str, headers: &[(String, String)]) -> Result<TransportReply> {
        tracing::trace!(url = %self.config.url, json = %body, "sending MCP HTTP request");

        let mut retries = self.config.retries;
        loop {
            let mut req = self.client.post(&self.config.url).body(body.to_string());
            for (key, value) in self.config.headers.iter().chain(headers) {
                req = req.header(key, value);
            }

            match req.send() {
                Ok(resp) => {
                    let status = resp.status();
                    if !status.is_success() {
                        let body = resp.text().unwrap_or_default();
                        return Err(McpError::Http {
                            status: status.as_u16(),
                            body,
                        });
                    }

                    let session_id = resp
                        .headers()
                        .get(SESSION_HEADER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);

                    let text = resp.text()?;
                    tracing::trace!(json = %text, "received MCP HTTP response");

                    return Ok(TransportReply {
                        session_id,
                        body: text,
                    });
                }
                // Connect failures never reached the server.
                Err(e) if e.is_connect() && retries > 0 => {
                    retries -= 1;
                    tracing::warn!(
                        error = %e,
                        retries_remaining = retries,
                        "HTTP request failed, retrying"
                    );
                    std::thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn endpoint(&self) -> &str {
        &self.config.url
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mock
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(any(test, feature = "testing"))]
pub use mock::{MockTransport, RecordedRequest};

#[cfg(any(test, feature = "testing"))]
mod mock {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::Value;

    use super::{Transport, TransportReply};
    use crate::error::Result;

    /// A request captured by [`MockTransport`].
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        /// Parsed request body.
        pub body: Value,
        /// Headers the caller supplied.
        pub headers: Vec<(String, String)>,
    }

    impl RecordedRequest {
        /// The JSON-RPC method, if the body has one.
        pub fn method(&self) -> Option<&str> {
            self.body.get("method").and_then(Value::as_str)
        }

        /// Value of a header, case-insensitively.
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    type MockHandler = dyn Fn(&Value) -> Result<TransportReply> + Send + Sync;

    /// In-memory transport answering from a closure.
    #[derive(Clone)]
    pub struct MockTransport {
        handler: Arc<MockHandler>,
        log: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockTransport {
        /// Create a mock whose replies are computed from the request body.
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&Value) -> Result<TransportReply> + Send + Sync + 'static,
        {
            Self {
                handler: Arc::new(handler),
                log: Arc::new(Mutex::new(Vec::new())),
            }
        }

        /// All requests seen so far.
        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.log.lock().clone()
        }

        /// Number of requests seen so far.
        pub fn request_count(&self) -> usize {
            self.log.lock().len()
        }

        /// Methods of all requests seen so far, in order.
        pub fn methods(&self) -> Vec<String> {
            self.log
                .lock()
                .iter()
                .filter_map(|r| r.method().map(str::to_string))
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn post(&self, body: &str, headers: &[(String, String)]) -> Result<TransportReply> {
            let parsed: Value = serde_json::from_str(body)?;
            self.log.lock().push(RecordedRequest {
                body: parsed.clone(),
                headers: headers.to_vec(),
            });
            (self.handler)(&parsed)
        }

        fn endpoint(&self) -> &str {
            "mock://mcp"
        }
    }
}
