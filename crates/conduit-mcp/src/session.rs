//! Session management for a single MCP endpoint.
//!
//! [`McpSession`] owns the transport, the request id counter and the session
//! identifier handed out by the server on `initialize`. Every request goes
//! through [`McpSession::request`], which merges the session header in.
//!
//! The identifier is revocable server-side. When a request carrying it is
//! refused, the call fails with [`McpError::SessionExpired`] and the caller has
//! to run [`McpSession::initialize`] again; nothing is retried behind its back.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde_json::Value;

use crate::codec::{self, RpcOutcome};
use crate::error::{McpError, Result};
use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcNotification, SESSION_HEADER, ServerInfo, methods,
};
use crate::transport::{HttpTransport, HttpTransportConfig, Transport, TransportReply};

/// A connection to one MCP server.
pub struct McpSession {
    transport: Box<dyn Transport>,
    session_id: RwLock<Option<String>>,
    server: RwLock<Option<InitializeResult>>,
    request_id: AtomicU64,
}

impl McpSession {
    /// Create a session over an arbitrary transport. Nothing is sent yet.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            session_id: RwLock::new(None),
            server: RwLock::new(None),
            request_id: AtomicU64::new(1),
        }
    }

    /// Create a session over HTTP. Call [`initialize`](Self::initialize) next.
    pub fn connect_http(config: HttpTransportConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::connect(config)?))
    }

    /// The endpoint this session talks to.
    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    /// The current session identifier, if the server issued one.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Server info from the last `initialize`, if the body carried it.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.server.read().as_ref().map(|r| r.server_info.clone())
    }

    /// Whether `initialize` has completed at least once.
    pub fn is_initialized(&self) -> bool {
        self.server.read().is_some()
    }

    /// Headers for the next request: the required pair plus the session id.
    pub fn current_headers(&self) -> Vec<(String, String)> {
        let mut headers = codec::required_headers();
        if let Some(id) = self.session_id.read().as_ref() {
            headers.push((SESSION_HEADER.to_string(), id.clone()));
        }
        headers
    }

    fn next_request_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Run the `initialize` handshake and adopt the session id the server
    /// returns in the `mcp-session-id` header.
    ///
    /// A missing header is not an error: later requests simply go out without
    /// one. Re-running this replaces any previous identifier.
    pub fn initialize(&self) -> Result<Option<String>> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let request = codec::encode(methods::INITIALIZE, Some(params), self.next_request_id());
        let body = serde_json::to_string(&request)?;

        // The handshake itself never carries a stale identifier.
        let reply = self.transport.post(&body, &codec::required_headers())?;
        let outcome = codec::classify(codec::decode(&reply.body));

        let init = match outcome {
            RpcOutcome::Error(e) => {
                return Err(McpError::server_error(e.code, e.message, e.data));
            }
            RpcOutcome::Result(value) => serde_json::from_value(value).unwrap_or_default(),
            RpcOutcome::Empty => InitializeResult::default(),
        };

        match &reply.session_id {
            Some(id) => tracing::info!(
                endpoint = %self.endpoint(),
                session_id = %id,
                server = %init.server_info.name,
                protocol = %init.protocol_version,
                "MCP session initialized"
            ),
            None => tracing::warn!(
                endpoint = %self.endpoint(),
                "server issued no session id; continuing without one"
            ),
        }

        *self.session_id.write() = reply.session_id.clone();
        *self.server.write() = Some(init);

        if let Err(e) = self.notify(methods::INITIALIZED, None) {
            tracing::warn!(error = %e, "failed to send initialized notification");
        }

        Ok(reply.session_id)
    }

    /// Send a request and classify the reply.
    ///
    /// A JSON-RPC `error` member comes back as [`RpcOutcome::Error`], not as
    /// `Err`; only transport-level failures are errors here.
    pub fn request(&self, method: &str, params: Option<Value>) -> Result<RpcOutcome> {
        let request = codec::encode(method, params, self.next_request_id());
        let body = serde_json::to_string(&request)?;

        tracing::debug!(method, id = request.id, "sending MCP request");

        let reply = self.post(&body)?;
        let outcome = codec::classify(codec::decode(&reply.body));

        if let RpcOutcome::Error(e) = &outcome {
            tracing::debug!(method, code = e.code, message = %e.message, "MCP request returned error");
        }
        Ok(outcome)
    }

    /// Send a notification (no response expected).
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        let notification = JsonRpcNotification::new(method, params);
        let body = serde_json::to_string(&notification)?;
        self.post(&body).map(|_| ())
    }

    fn post(&self, payload: &str) -> Result<TransportReply> {
        let headers = self.current_headers();
        match self.transport.post(payload, &headers) {
            Err(McpError::Http { status, body }) => {
                let sent = self.session_id();
                match sent {
                    Some(session_id) if rejects_session(status, &body) => {
                        tracing::warn!(%session_id, status, "server rejected MCP session");
                        Err(McpError::SessionExpired { session_id })
                    }
                    _ => Err(McpError::Http { status, body }),
                }
            }
            other => other,
        }
    }
}

/// Streamable HTTP servers answer 404 for unknown sessions; some answer 400
/// and say so in the body.
fn rejects_session(status: u16, body: &str) -> bool {
    status == 404 || (status == 400 && body.to_ascii_lowercase().contains("session"))
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("endpoint", &self.endpoint())
            .field("session_id", &self.session_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn ok(id: &Value, result: Value) -> TransportReply {
        TransportReply::body(
            json!({"jsonrpc": "2.0", "id": id.clone(), "result": result}).to_string(),
        )
    }

    fn server(session: &'static str) -> MockTransport {
        MockTransport::new(move |req| match req["method"].as_str() {
            Some("initialize") => Ok(ok(
                &req["id"],
                json!({"protocolVersion": "2024-11-05", "capabilities": {},
                       "serverInfo": {"name": "demo", "version": "1.0"}}),
            )
            .with_session(session)),
            _ => Ok(ok(&req["id"], json!({}))),
        })
    }

    #[test]
    fn test_initialize_adopts_session_header() {
        let mock = server("S-123");
        let session = McpSession::new(mock.clone());

        assert!(session.session_id().is_none());
        let id = session.initialize().unwrap();
        assert_eq!(id.as_deref(), Some("S-123"));
        assert_eq!(session.server_info().unwrap().name, "demo");

        session.request("tools/list", None).unwrap();
        session.request("resources/list", None).unwrap();

        let requests = mock.requests();
        assert_eq!(
            mock.methods(),
            vec!["initialize", "notifications/initialized", "tools/list", "resources/list"]
        );
        assert_eq!(requests[0].header(SESSION_HEADER), None);
        for req in &requests[1..] {
            assert_eq!(req.header(SESSION_HEADER), Some("S-123"));
            assert_eq!(req.header("Accept"), Some(codec::ACCEPT));
        }
    }

    #[test]
    fn test_reinitialize_replaces_session() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mock = MockTransport::new(move |req| {
            if req["method"] == "initialize" {
                let n = c.fetch_add(1, Ordering::SeqCst);
                Ok(ok(&req["id"], json!({})).with_session(format!("S-{n}")))
            } else {
                Ok(ok(&req["id"], json!({})))
            }
        });
        let session = McpSession::new(mock.clone());

        session.initialize().unwrap();
        session.request("tools/list", None).unwrap();
        session.initialize().unwrap();
        session.request("tools/list", None).unwrap();

        let lists: Vec<_> = mock
            .requests()
            .into_iter()
            .filter(|r| r.method() == Some("tools/list"))
            .map(|r| r.header(SESSION_HEADER).map(str::to_string))
            .collect();
        assert_eq!(lists, vec![Some("S-0".to_string()), Some("S-1".to_string())]);
    }

    #[test]
    fn test_missing_session_header_fails_soft() {
        let mock = MockTransport::new(|req| Ok(ok(&req["id"], json!({}))));
        let session = McpSession::new(mock.clone());

        assert_eq!(session.initialize().unwrap(), None);
        session.request("tools/list", None).unwrap();
        assert!(mock.requests()[2].header(SESSION_HEADER).is_none());
        assert!(session.is_initialized());
    }

    #[test]
    fn test_request_ids_increase() {
        let mock = MockTransport::new(|req| Ok(ok(&req["id"], json!({}))));
        let session = McpSession::new(mock.clone());
        session.request("a", None).unwrap();
        session.request("b", None).unwrap();
        let ids: Vec<u64> = mock
            .requests()
            .iter()
            .map(|r| r.body["id"].as_u64().unwrap())
            .collect();
        assert!(ids[0] < ids[1]);
    }

    #[test]
    fn test_rejected_session_is_explicit() {
        let mock = MockTransport::new(|req| {
            if req["method"] == "initialize" {
                Ok(ok(&req["id"], json!({})).with_session("gone"))
            } else if req["method"] == "tools/list" {
                Err(McpError::Http {
                    status: 404,
                    body: "Session not found".to_string(),
                })
            } else {
                Ok(ok(&req["id"], json!({})))
            }
        });
        let session = McpSession::new(mock);
        session.initialize().unwrap();

        let err = session.request("tools/list", None).unwrap_err();
        assert!(err.is_session_expired());
        // The identifier is kept until the caller re-initializes.
        assert_eq!(session.session_id().as_deref(), Some("gone"));
    }

    #[test]
    fn test_http_error_without_session_passes_through() {
        let mock = MockTransport::new(|_| {
            Err(McpError::Http {
                status: 404,
                body: "no such endpoint".to_string(),
            })
        });
        let session = McpSession::new(mock);
        let err = session.request("tools/list", None).unwrap_err();
        assert!(matches!(err, McpError::Http { status: 404, .. }));
    }

    #[test]
    fn test_initialize_error_response() {
        let mock = MockTransport::new(|req| {
            Ok(TransportReply::body(
                json!({"jsonrpc": "2.0", "id": req["id"],
                       "error": {"code": -32602, "message": "unsupported protocol"}})
                .to_string(),
            ))
        });
        let session = McpSession::new(mock);
        let err = session.initialize().unwrap_err();
        assert!(matches!(err, McpError::ServerError { code: -32602, .. }));
        assert!(!session.is_initialized());
    }
}
