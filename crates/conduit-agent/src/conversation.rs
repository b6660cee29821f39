//! The conversation loop.
//!
//! One run takes a user input through as many LLM/tool rounds as the model
//! asks for, up to `max_iterations`:
//!
//! ```text
//! AwaitingLlm ──(no tool calls)──────────────▶ Done
//!     │
//!     ├──(tool calls, cap reached)───────────▶ Incomplete
//!     │
//!     └──(tool calls)──▶ AwaitingToolResults ──(all calls answered)──▶ AwaitingLlm
//! ```
//!
//! Every requested call gets exactly one tool message, in order, before the
//! next LLM call. Transport failures abort the run; everything the server or
//! the model gets wrong is reported back to the model as a tool message.

use std::sync::Arc;

use conduit_mcp::{InvocationResult, InvocationRouter, McpSession};

use crate::backend::{LlmBackend, SharedBackend};
use crate::error::{AgentError, Result};
use crate::memory::{InteractionRecord, InteractionStore};
use crate::types::{Message, PendingToolCall, Role};

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Use the available tools \
     and resources when they help answer the user's request.";

/// Default cap on tool-call rounds per run.
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Default number of stored messages loaded before a run.
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration & outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub system_prompt: String,
    /// Tool-call rounds allowed per run.
    pub max_iterations: u32,
    /// Stored messages loaded before the first LLM call.
    pub history_limit: usize,
    /// Key under which the run is stored.
    pub history_key: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            history_key: "default".to_string(),
        }
    }
}

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingLlm,
    AwaitingToolResults,
    /// The model answered without asking for tools.
    Done,
    /// The model still wanted tools when the round cap was reached.
    Incomplete,
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct ConversationOutcome {
    /// `Done` or `Incomplete`.
    pub state: LoopState,
    /// Final answer, or a note explaining why there is none.
    pub text: String,
    /// Tool-call rounds executed.
    pub rounds: u32,
    /// LLM calls made.
    pub llm_calls: u32,
    /// Full conversation state at the end of the run.
    pub messages: Vec<Message>,
}

impl ConversationOutcome {
    pub fn is_done(&self) -> bool {
        self.state == LoopState::Done
    }
}

/// Called after each tool invocation, for progress display.
pub type ToolObserver = Box<dyn Fn(&PendingToolCall, &InvocationResult) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Drives an LLM through tool calls against one MCP session.
pub struct ConversationLoop {
    backend: SharedBackend,
    config: LoopConfig,
    store: Option<Arc<dyn InteractionStore>>,
    observer: Option<ToolObserver>,
}

impl ConversationLoop {
    /// Create a loop with the given backend and configuration.
    pub fn new(backend: SharedBackend, config: LoopConfig) -> Self {
        Self {
            backend,
            config,
            store: None,
            observer: None,
        }
    }

    /// Create a builder for fluent construction.
    pub fn builder() -> ConversationLoopBuilder {
        ConversationLoopBuilder::new()
    }

    /// Get the loop configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run one user input to completion.
    ///
    /// `history` holds the earlier turns the model should see, placed between
    /// the system prompt and `input`. It is the only context a run gets; the
    /// store is never read here. Callers that want stored turns pass
    /// [`stored_history`](Self::stored_history) in, once.
    pub fn run(
        &self,
        session: &McpSession,
        router: &InvocationRouter,
        history: &[Message],
        input: &str,
    ) -> Result<ConversationOutcome> {
        let tools = router.catalog().function_schemas();

        let mut messages = vec![Message::system(&self.config.system_prompt)];
        messages.extend_from_slice(history);
        messages.push(Message::user(input));

        tracing::info!(
            backend = self.backend.name(),
            tools = tools.len(),
            history = messages.len() - 2,
            max_iterations = self.config.max_iterations,
            "Conversation run started"
        );

        let mut state = LoopState::AwaitingLlm;
        let mut rounds = 0u32;
        let mut llm_calls = 0u32;

        let text = loop {
            debug_assert_eq!(state, LoopState::AwaitingLlm);
            tracing::debug!(round = rounds, messages = messages.len(), "Calling LLM");

            let reply = self.backend.complete(&messages, &tools)?;
            llm_calls += 1;

            if !reply.has_tool_calls() {
                let text = reply.text.unwrap_or_default();
                messages.push(Message::assistant(&text));
                state = LoopState::Done;
                break text;
            }

            if rounds >= self.config.max_iterations {
                tracing::warn!(
                    rounds,
                    requested = reply.tool_calls.len(),
                    "Max iterations reached; not executing further tool calls"
                );
                state = LoopState::Incomplete;
                break format!(
                    "[Stopped after {rounds} tool round(s) without a final answer]"
                );
            }

            state = LoopState::AwaitingToolResults;
            tracing::info!(
                state = ?state,
                round = rounds + 1,
                tool_count = reply.tool_calls.len(),
                tools = %reply.tool_calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
                "Executing tools"
            );

            let calls = reply.tool_calls.clone();
            messages.push(Message::assistant_with_calls(reply.text, reply.tool_calls));

            for call in &calls {
                let result = router.invoke_json(session, &call.name, &call.arguments)?;
                tracing::debug!(
                    call_id = %call.call_id,
                    name = %call.name,
                    success = result.is_success(),
                    "Tool call answered"
                );
                if let Some(observer) = &self.observer {
                    observer(call, &result);
                }
                messages.push(Message::tool(&call.call_id, result.conversation_payload()));
            }

            rounds += 1;
            state = LoopState::AwaitingLlm;
        };

        tracing::info!(
            state = ?state,
            rounds,
            llm_calls,
            response_len = text.len(),
            "Conversation run finished"
        );

        self.save_exchange(input, &text, state);

        Ok(ConversationOutcome {
            state,
            text,
            rounds,
            llm_calls,
            messages,
        })
    }

    /// The last `history_limit` user and assistant messages saved under the
    /// history key. Empty without a store, or when the store cannot be read.
    pub fn stored_history(&self) -> Vec<Message> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.history(&self.config.history_key, self.config.history_limit) {
            Ok(records) => records
                .iter()
                .filter(|r| matches!(r.role, Role::User | Role::Assistant))
                .map(InteractionRecord::to_message)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversation history");
                Vec::new()
            }
        }
    }

    fn save_exchange(&self, input: &str, text: &str, state: LoopState) {
        let Some(store) = &self.store else {
            return;
        };
        let key = &self.config.history_key;
        let mut records = vec![InteractionRecord::new(key, Role::User, input)];
        if state == LoopState::Done && !text.is_empty() {
            records.push(InteractionRecord::new(key, Role::Assistant, text));
        }
        for record in records {
            if let Err(e) = store.append(record) {
                tracing::warn!(error = %e, "Failed to save interaction");
            }
        }
    }
}

impl std::fmt::Debug for ConversationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLoop")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .field("store", &self.store.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for constructing a [`ConversationLoop`].
#[derive(Default)]
pub struct ConversationLoopBuilder {
    backend: Option<SharedBackend>,
    config: LoopConfig,
    store: Option<Arc<dyn InteractionStore>>,
    observer: Option<ToolObserver>,
}

impl ConversationLoopBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the LLM backend.
    pub fn with_backend(mut self, backend: impl LlmBackend + 'static) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Set the LLM backend from a shared reference.
    pub fn with_shared_backend(mut self, backend: SharedBackend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    /// Set the tool-call round cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Persist and reload history under `key`.
    pub fn with_store(mut self, store: Arc<dyn InteractionStore>, key: impl Into<String>) -> Self {
        self.store = Some(store);
        self.config.history_key = key.into();
        self
    }

    /// Set how many stored messages are loaded per run.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    /// Observe each tool invocation.
    pub fn with_observer(
        mut self,
        observer: impl Fn(&PendingToolCall, &InvocationResult) + Send + Sync + 'static,
    ) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Build the loop.
    pub fn build(self) -> Result<ConversationLoop> {
        let backend = self
            .backend
            .ok_or_else(|| AgentError::config("LLM backend is required"))?;

        let mut conversation = ConversationLoop::new(backend, self.config);
        conversation.store = self.store;
        conversation.observer = self.observer;
        Ok(conversation)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
