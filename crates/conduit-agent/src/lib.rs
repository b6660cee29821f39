//! Conversation loop for Conduit.
//!
//! Connects an LLM with function calling to the capabilities of an MCP
//! server: the model sees the catalog as function schemas, asks for calls,
//! and gets each result back as a tool message until it answers in text or
//! the round cap is hit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ConversationLoop                                           │
//! │  - System prompt, earlier turns, user input                 │
//! │  - LLM call → tool round → LLM call ... (capped)            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!       ┌──────────┐    ┌──────────────┐  ┌──────────────┐
//!       │LlmBackend│    │InvocationRtr │  │InteractionSt.│
//!       │ (OpenAI) │    │(conduit-mcp) │  │ (JSONL/mem)  │
//!       └──────────┘    └──────────────┘  └──────────────┘
//! ```
//!
//! # Core Components
//!
//! - [`ConversationLoop`]: drives one user input to a final answer
//! - [`LlmBackend`]: blocking chat completion with tools
//! - [`InteractionStore`]: per-key conversation memory
//! - [`Orchestrator`]: analyze, plan, delegate to several loops, aggregate

pub mod backend;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod openai;
pub mod orchestrator;
pub mod types;

pub use backend::{LlmBackend, SharedBackend};
#[cfg(any(test, feature = "testing"))]
pub use backend::{MockBackend, MockRequest};
pub use conversation::{
    ConversationLoop, ConversationLoopBuilder, ConversationOutcome, DEFAULT_HISTORY_LIMIT,
    DEFAULT_MAX_ITERATIONS, DEFAULT_SYSTEM_PROMPT, LoopConfig, LoopState, ToolObserver,
};
pub use error::{AgentError, Result};
pub use memory::{InMemoryInteractionStore, InteractionRecord, InteractionStore, JsonlInteractionStore};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use orchestrator::{
    Delegate, DelegateReport, DelegateStatus, OrchestrationResult, Orchestrator, OrchestratorConfig,
};
pub use types::{LlmReply, Message, PendingToolCall, Role, ToolDefinition};
