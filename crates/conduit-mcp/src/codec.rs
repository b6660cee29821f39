//! Wire codec for MCP over HTTP.
//!
//! Requests are plain JSON-RPC 2.0 objects. Responses arrive either as a raw
//! JSON body or as Server-Sent-Events text where one `data:` line carries the
//! JSON-RPC payload:
//!
//! ```text
//! event: message
//! data: {"jsonrpc":"2.0","id":3,"result":{...}}
//! ```
//!
//! Decoding never fails. A body with nothing usable in it decodes to an empty
//! mapping, which [`classify`] turns into [`RpcOutcome::Empty`].

use serde_json::{Map, Value};

use crate::protocol::{JsonRpcError, JsonRpcRequest};

/// `Content-Type` sent on every request.
pub const CONTENT_TYPE: &str = "application/json";

/// `Accept` sent on every request; the server picks the framing.
pub const ACCEPT: &str = "application/json, text/event-stream";

/// Headers required on every call, before the session header is merged in.
pub fn required_headers() -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
        ("Accept".to_string(), ACCEPT.to_string()),
    ]
}

/// Build a request envelope.
pub fn encode(method: &str, params: Option<Value>, id: u64) -> JsonRpcRequest {
    JsonRpcRequest::new(id, method, params)
}

/// Decode a response body into a JSON-RPC object.
///
/// Plain JSON bodies are returned as-is. Otherwise the body is scanned line by
/// line and the first `data:` line whose payload is a JSON object wins.
pub fn decode(body: &str) -> Map<String, Value> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body.trim()) {
        return map;
    }

    for line in body.lines() {
        let Some(payload) = line.strip_prefix("data:") else {
            continue;
        };
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(payload.trim()) {
            return map;
        }
    }

    if !body.trim().is_empty() {
        tracing::debug!(body_len = body.len(), "no JSON-RPC payload found in response");
    }
    Map::new()
}

/// What a decoded response amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// The server returned a `result` member.
    Result(Value),
    /// The server returned an `error` member.
    Error(JsonRpcError),
    /// Nothing came back: no result and no error.
    Empty,
}

/// Classify a decoded object. An `error` member takes precedence.
pub fn classify(mut object: Map<String, Value>) -> RpcOutcome {
    if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
        return RpcOutcome::Error(JsonRpcError::from_value(error));
    }
    match object.remove("result") {
        Some(result) => RpcOutcome::Result(result),
        None => RpcOutcome::Empty,
    }
}
