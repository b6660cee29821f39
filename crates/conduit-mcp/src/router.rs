//! Invocation routing.
//!
//! [`InvocationRouter`] executes a named capability against a session. The
//! dispatch target comes from the catalog entry, never from the name itself,
//! and sensitive operations are put to an [`ApprovalHandler`] first.
//!
//! Everything the server or the caller can get wrong (unknown names, bad
//! arguments, JSON-RPC errors, refusals) is an [`InvocationResult`] variant.
//! Only transport failures come back as `Err`.

use std::collections::HashMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::Captures;
use serde_json::{Value, json};

use crate::approval::{ApprovalDecision, ApprovalHandler, ApprovalPolicy, ApprovalRequest};
use crate::catalog::{
    Catalog, CapabilityDescriptor, Dispatch, RESOURCE_PREFIX, placeholder_pattern, placeholders,
};
use crate::codec::RpcOutcome;
use crate::error::Result;
use crate::protocol::{CallToolParams, JsonRpcError, ReadResourceParams, methods};
use crate::session::McpSession;

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult {
    /// The server returned a result; this is the raw envelope.
    Success(Value),
    /// The server replied with neither a result nor an error.
    Empty,
    /// The server returned a JSON-RPC error.
    Failed(JsonRpcError),
    /// No capability with this name exists.
    UnknownOperation { name: String },
    /// Arguments were unparsable or missing a required value.
    InvalidArguments { name: String, reason: String },
    /// The human declined the operation.
    Declined { name: String },
    /// The human cancelled the operation.
    Cancelled { name: String },
}

impl InvocationResult {
    /// Whether the server produced a result.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The value handed back to the conversation.
    ///
    /// Successful results are passed through untouched. An empty reply is
    /// `{}`; everything else is an `{"error": reason}` envelope.
    pub fn conversation_value(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::Empty => json!({}),
            Self::Failed(e) => json!({"error": e.message, "code": e.code}),
            other => json!({"error": other.to_string()}),
        }
    }

    /// [`conversation_value`](Self::conversation_value) serialized for a
    /// tool-role message.
    pub fn conversation_payload(&self) -> String {
        self.conversation_value().to_string()
    }

    /// Text for humans.
    ///
    /// Unwraps the first text content item (`content` for tools, `contents`
    /// for resources) and pretty-prints it when it holds JSON. Falls back to
    /// the whole envelope.
    pub fn display_text(&self) -> String {
        match self {
            Self::Success(value) => {
                let text = ["content", "contents"].iter().find_map(|key| {
                    value
                        .get(*key)
                        .and_then(|c| c.get(0))
                        .and_then(|item| item.get("text"))
                        .and_then(Value::as_str)
                });
                match text {
                    Some(text) => match serde_json::from_str::<Value>(text) {
                        Ok(parsed @ (Value::Object(_) | Value::Array(_))) => {
                            serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| text.into())
                        }
                        _ => text.to_string(),
                    },
                    None => serde_json::to_string_pretty(value)
                        .unwrap_or_else(|_| value.to_string()),
                }
            }
            Self::Empty => "(no result)".to_string(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for InvocationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(_) => f.write_str("success"),
            Self::Empty => f.write_str("no result returned"),
            Self::Failed(e) => write!(f, "server error {}: {}", e.code, e.message),
            Self::UnknownOperation { name } => write!(f, "unknown operation '{name}'"),
            Self::InvalidArguments { name, reason } => {
                write!(f, "invalid arguments for '{name}': {reason}")
            }
            Self::Declined { name } => write!(f, "operation '{name}' was declined by the user"),
            Self::Cancelled { name } => write!(f, "operation '{name}' was cancelled by the user"),
        }
    }
}

/// Routes invocations to `tools/call` or `resources/read`.
pub struct InvocationRouter {
    catalog: Catalog,
    policy: ApprovalPolicy,
    approvals: Box<dyn ApprovalHandler>,
}

impl InvocationRouter {
    pub fn new(
        catalog: Catalog,
        policy: ApprovalPolicy,
        approvals: impl ApprovalHandler + 'static,
    ) -> Self {
        Self {
            catalog,
            policy,
            approvals: Box::new(approvals),
        }
    }

    /// The catalog this router dispatches against.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The approval policy in force.
    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Invoke with arguments given as raw JSON text, as an LLM produces them.
    /// Blank text means no arguments.
    pub fn invoke_json(
        &self,
        session: &McpSession,
        name: &str,
        raw_arguments: &str,
    ) -> Result<InvocationResult> {
        let arguments = if raw_arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str::<Value>(raw_arguments) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(name, error = %e, "unparsable tool arguments");
                    return Ok(InvocationResult::InvalidArguments {
                        name: name.to_string(),
                        reason: format!("arguments are not valid JSON: {e}"),
                    });
                }
            }
        };
        self.invoke(session, name, arguments)
    }

    /// Invoke a capability by name.
    pub fn invoke(
        &self,
        session: &McpSession,
        name: &str,
        arguments: Value,
    ) -> Result<InvocationResult> {
        let Some(descriptor) = self.catalog.find(name) else {
            if name.starts_with(RESOURCE_PREFIX) {
                tracing::warn!(name, "unresolved resource name; not in catalog");
            } else {
                tracing::warn!(name, "unknown operation requested");
            }
            return Ok(InvocationResult::UnknownOperation {
                name: name.to_string(),
            });
        };

        let arguments = match arguments {
            Value::Null => json!({}),
            obj @ Value::Object(_) => obj,
            other => {
                return Ok(InvocationResult::InvalidArguments {
                    name: name.to_string(),
                    reason: format!("expected a JSON object, got {other}"),
                });
            }
        };

        // Resolve the target before asking anyone for approval.
        let (method, params) = match &descriptor.dispatch {
            Dispatch::Resource { uri_template } => match expand_uri(uri_template, &arguments)? {
                Ok(uri) => {
                    tracing::debug!(name, %uri, "resolved resource URI");
                    (
                        methods::RESOURCES_READ,
                        serde_json::to_value(ReadResourceParams { uri })?,
                    )
                }
                Err(reason) => {
                    return Ok(InvocationResult::InvalidArguments {
                        name: name.to_string(),
                        reason,
                    });
                }
            },
            Dispatch::Tool { tool_name } => {
                tracing::debug!(name, tool = %tool_name, "resolved tool call");
                (
                    methods::TOOLS_CALL,
                    serde_json::to_value(CallToolParams {
                        name: tool_name.clone(),
                        arguments: arguments.clone(),
                    })?,
                )
            }
        };

        if self.policy.requires_approval(descriptor) {
            let request = ApprovalRequest::for_capability(descriptor, &arguments);
            let decision = self.approvals.decide(&request)?;
            tracing::info!(name, %decision, "approval decision");
            match decision {
                ApprovalDecision::Accept => {}
                ApprovalDecision::Decline => {
                    return Ok(InvocationResult::Declined {
                        name: name.to_string(),
                    });
                }
                ApprovalDecision::Cancel => {
                    return Ok(InvocationResult::Cancelled {
                        name: name.to_string(),
                    });
                }
            }
        }

        tracing::info!(name, method, "invoking capability");
        let outcome = session.request(method, Some(params))?;
        Ok(into_result(descriptor, outcome))
    }
}

impl fmt::Debug for InvocationRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationRouter")
            .field("capabilities", &self.catalog.len())
            .field("policy", &self.policy)
            .finish()
    }
}

fn into_result(descriptor: &CapabilityDescriptor, outcome: RpcOutcome) -> InvocationResult {
    match outcome {
        RpcOutcome::Result(value) => InvocationResult::Success(value),
        RpcOutcome::Error(e) => {
            tracing::warn!(
                name = %descriptor.name,
                code = e.code,
                message = %e.message,
                "invocation failed"
            );
            InvocationResult::Failed(e)
        }
        RpcOutcome::Empty => {
            tracing::debug!(name = %descriptor.name, "invocation returned nothing");
            InvocationResult::Empty
        }
    }
}

/// Bytes left as-is in a substituted value: RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Substitute every `{placeholder}` in `template` from `arguments`, in one
/// pass over the template.
///
/// Numbers, strings and booleans are rendered as text and percent-encoded as
/// a single path segment. The inner `Err` carries the reason the arguments
/// cannot fill the template.
pub fn expand_uri(
    template: &str,
    arguments: &Value,
) -> Result<std::result::Result<String, String>> {
    let mut values: HashMap<String, String> = HashMap::new();
    for token in placeholders(template)? {
        let text = match arguments.get(&token) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Null) | None => return Ok(Err(format!("missing value for '{token}'"))),
            Some(other) => {
                return Ok(Err(format!(
                    "value for '{token}' must be a scalar, got {other}"
                )));
            }
        };
        values.insert(token, utf8_percent_encode(&text, PATH_SEGMENT).to_string());
    }

    let uri = placeholder_pattern()?.replace_all(template, |caps: &Captures| {
        values
            .get(&caps[1])
            .cloned()
            .unwrap_or_else(|| caps[0].to_string())
    });
    Ok(Ok(uri.into_owned()))
}
