//! Human approval for sensitive operations.
//!
//! The router asks an [`ApprovalHandler`] before running anything the
//! [`ApprovalPolicy`] marks as sensitive. The call blocks until a decision is
//! made; a declined or cancelled call never reaches the server.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::CapabilityDescriptor;
use crate::error::{McpError, Result};

/// Tools gated by default.
pub const DEFAULT_SENSITIVE_TOOLS: &[&str] = &["get_user_info"];

/// Outcome of an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    /// Run the operation.
    Accept,
    /// Refuse this operation; the conversation continues.
    Decline,
    /// Abandon the operation without a verdict.
    Cancel,
}

impl fmt::Display for ApprovalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accept => "accept",
            Self::Decline => "decline",
            Self::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

impl FromStr for ApprovalDecision {
    type Err = McpError;

    /// Parse a typed answer. Accepts the full words and their first letters,
    /// plus `yes`/`no`.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" | "a" | "yes" | "y" => Ok(Self::Accept),
            "decline" | "d" | "no" | "n" => Ok(Self::Decline),
            "cancel" | "c" => Ok(Self::Cancel),
            other => Err(McpError::approval(format!(
                "unrecognized decision '{other}' (expected accept, decline or cancel)"
            ))),
        }
    }
}

/// What the human is asked about.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalRequest {
    /// Function name of the operation.
    pub operation: String,
    /// Question to put to the human.
    pub prompt: String,
    /// Arguments the operation would run with.
    pub arguments: Value,
}

impl ApprovalRequest {
    /// Build the request for a capability about to be invoked.
    pub fn for_capability(descriptor: &CapabilityDescriptor, arguments: &Value) -> Self {
        Self {
            operation: descriptor.name.clone(),
            prompt: format!(
                "Operation '{}' requires approval. Allow it to run?",
                descriptor.name
            ),
            arguments: arguments.clone(),
        }
    }
}

/// Decides whether a sensitive operation may run.
///
/// An `Err` means no decision could be obtained at all (closed stdin and the
/// like) and aborts the turn.
pub trait ApprovalHandler: Send + Sync {
    fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision>;
}

/// Answers every request with the same decision. Used for non-interactive
/// runs and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticApprovalHandler {
    decision: ApprovalDecision,
}

impl StaticApprovalHandler {
    pub fn new(decision: ApprovalDecision) -> Self {
        Self { decision }
    }

    pub fn accept_all() -> Self {
        Self::new(ApprovalDecision::Accept)
    }

    pub fn decline_all() -> Self {
        Self::new(ApprovalDecision::Decline)
    }
}

impl ApprovalHandler for StaticApprovalHandler {
    fn decide(&self, request: &ApprovalRequest) -> Result<ApprovalDecision> {
        tracing::debug!(
            operation = %request.operation,
            decision = %self.decision,
            "approval decided by fixed policy"
        );
        Ok(self.decision)
    }
}

/// Which operations need approval.
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    sensitive: HashSet<String>,
    honor_annotations: bool,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_TOOLS.iter().copied())
    }
}

impl ApprovalPolicy {
    /// Gate the named operations, and anything the server flags.
    pub fn new<I, S>(sensitive: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sensitive: sensitive.into_iter().map(Into::into).collect(),
            honor_annotations: true,
        }
    }

    /// Nothing needs approval.
    pub fn none() -> Self {
        Self {
            sensitive: HashSet::new(),
            honor_annotations: false,
        }
    }

    /// Whether server-side approval hints are respected.
    pub fn with_annotations(mut self, honor: bool) -> Self {
        self.honor_annotations = honor;
        self
    }

    /// Whether invoking `descriptor` needs a human decision.
    pub fn requires_approval(&self, descriptor: &CapabilityDescriptor) -> bool {
        self.sensitive.contains(&descriptor.name)
            || (self.honor_annotations && descriptor.requires_approval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ToolInfo;
    use serde_json::json;

    fn descriptor(value: Value) -> CapabilityDescriptor {
        let tool: ToolInfo = serde_json::from_value(value).unwrap();
        CapabilityDescriptor::from_tool(&tool)
    }

    #[test]
    fn test_parse_decision() {
        assert_eq!("accept".parse::<ApprovalDecision>().unwrap(), ApprovalDecision::Accept);
        assert_eq!(" Y \n".parse::<ApprovalDecision>().unwrap(), ApprovalDecision::Accept);
        assert_eq!("decline".parse::<ApprovalDecision>().unwrap(), ApprovalDecision::Decline);
        assert_eq!("C".parse::<ApprovalDecision>().unwrap(), ApprovalDecision::Cancel);
        assert!(matches!(
            "maybe".parse::<ApprovalDecision>(),
            Err(McpError::Approval(_))
        ));
    }

    #[test]
    fn test_default_policy_gates_user_info() {
        let policy = ApprovalPolicy::default();
        assert!(policy.requires_approval(&descriptor(json!({"name": "get_user_info"}))));
        assert!(!policy.requires_approval(&descriptor(json!({"name": "add_two_numbers"}))));
    }

    #[test]
    fn test_policy_annotations() {
        let flagged = descriptor(json!({
            "name": "delete_user",
            "annotations": {"destructiveHint": true}
        }));
        assert!(ApprovalPolicy::default().requires_approval(&flagged));
        assert!(
            !ApprovalPolicy::default()
                .with_annotations(false)
                .requires_approval(&flagged)
        );
        assert!(!ApprovalPolicy::none().requires_approval(&flagged));
    }

    #[test]
    fn test_static_handler() {
        let request = ApprovalRequest::for_capability(
            &descriptor(json!({"name": "get_user_info"})),
            &json!({"user_id": 1}),
        );
        assert!(request.prompt.contains("get_user_info"));
        assert_eq!(
            StaticApprovalHandler::decline_all().decide(&request).unwrap(),
            ApprovalDecision::Decline
        );
        assert_eq!(
            StaticApprovalHandler::accept_all().decide(&request).unwrap(),
            ApprovalDecision::Accept
        );
    }
}
