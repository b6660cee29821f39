//! MCP (Model Context Protocol) client engine for Conduit.
//!
//! This crate talks to a single MCP server over streamable HTTP, turns what
//! the server offers into a flat set of callable capabilities, and executes
//! them on request.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  InvocationRouter                                           │
//! │  - Looks up the capability, asks for approval if sensitive  │
//! │  - tools/call or resources/read                             │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Catalog                                                    │
//! │  - tools/list, resources/list, resources/templates/list,    │
//! │    prompts/list                                             │
//! │  - Dispatch target fixed per entry at build time            │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpSession                                                 │
//! │  - initialize, mcp-session-id header on every request       │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Transport + codec                                          │
//! │  - JSON-RPC 2.0 over HTTP POST, JSON or SSE replies         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use conduit_mcp::{
//!     ApprovalPolicy, Catalog, HttpTransportConfig, InvocationRouter, McpSession,
//!     StaticApprovalHandler,
//! };
//!
//! let session = McpSession::connect_http(HttpTransportConfig::new("http://localhost:8000/mcp"))?;
//! session.initialize()?;
//!
//! let catalog = Catalog::refresh(&session)?;
//! let router = InvocationRouter::new(
//!     catalog,
//!     ApprovalPolicy::default(),
//!     StaticApprovalHandler::decline_all(),
//! );
//!
//! let result = router.invoke(&session, "add_two_numbers", json!({"a": 5, "b": 3}))?;
//! println!("{}", result.display_text());
//! ```

pub mod approval;
pub mod catalog;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

pub use approval::{
    ApprovalDecision, ApprovalHandler, ApprovalPolicy, ApprovalRequest, DEFAULT_SENSITIVE_TOOLS,
    StaticApprovalHandler,
};
pub use catalog::{
    CapabilityDescriptor, CapabilityKind, Catalog, Dispatch, NameCollision, ToolDefinition,
};
pub use codec::RpcOutcome;
pub use error::{McpError, Result};
pub use protocol::{
    InitializeResult, JsonRpcError, JsonRpcRequest, PromptArgument, PromptInfo, ResourceInfo,
    ServerInfo, ToolInfo,
};
pub use router::{InvocationResult, InvocationRouter};
pub use session::McpSession;
pub use transport::{HttpTransport, HttpTransportConfig, Transport, TransportReply};
#[cfg(any(test, feature = "testing"))]
pub use transport::{MockTransport, RecordedRequest};
