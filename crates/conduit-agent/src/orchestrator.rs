//! Task orchestration across several conversation loops.
//!
//! The [`Orchestrator`] runs a fixed pipeline for one task:
//!
//! ```text
//! analyze ──▶ plan ──▶ delegate (each agent in turn) ──▶ aggregate
//! ```
//!
//! Analysis, planning and aggregation are plain LLM calls without tools. Each
//! [`Delegate`] owns its own MCP session, router and [`ConversationLoop`];
//! delegates share nothing except, optionally, the interaction store.

use std::sync::Arc;

use conduit_mcp::{InvocationRouter, McpSession};
use serde_json::json;

use crate::backend::SharedBackend;
use crate::conversation::{ConversationLoop, LoopState};
use crate::error::Result;
use crate::memory::{InteractionRecord, InteractionStore};
use crate::types::{Message, Role};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Key under which the plan and final output are stored.
    pub history_key: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            history_key: "orchestrator".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result
// ─────────────────────────────────────────────────────────────────────────────

/// How one delegate's run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum DelegateStatus {
    /// The agent produced a final answer.
    Completed,
    /// The agent hit its round cap.
    Incomplete,
    /// The agent's run aborted; the text holds the error.
    Failed,
}

/// What one delegate contributed.
#[derive(Debug, Clone)]
pub struct DelegateReport {
    pub agent: String,
    pub status: DelegateStatus,
    pub text: String,
}

/// Result of one orchestrated task.
#[derive(Debug, Clone)]
pub struct OrchestrationResult {
    pub analysis: String,
    pub plan: String,
    /// One report per delegate, in delegation order.
    pub reports: Vec<DelegateReport>,
    /// The aggregated answer.
    pub output: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// One agent the orchestrator can hand work to.
pub struct Delegate {
    name: String,
    session: McpSession,
    router: InvocationRouter,
    conversation: ConversationLoop,
}

impl Delegate {
    /// `session` must already be initialized and `router` built from its
    /// catalog.
    pub fn new(
        name: impl Into<String>,
        session: McpSession,
        router: InvocationRouter,
        conversation: ConversationLoop,
    ) -> Self {
        Self {
            name: name.into(),
            session,
            router,
            conversation,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, input: &str) -> DelegateReport {
        let history = self.conversation.stored_history();
        match self
            .conversation
            .run(&self.session, &self.router, &history, input)
        {
            Ok(outcome) => DelegateReport {
                agent: self.name.clone(),
                status: match outcome.state {
                    LoopState::Done => DelegateStatus::Completed,
                    _ => DelegateStatus::Incomplete,
                },
                text: outcome.text,
            },
            Err(e) => {
                tracing::warn!(agent = %self.name, error = %e, "delegate run failed");
                DelegateReport {
                    agent: self.name.clone(),
                    status: DelegateStatus::Failed,
                    text: e.to_string(),
                }
            }
        }
    }
}

/// Breaks a task down, hands it to delegates and merges their answers.
///
/// # Example
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::new(backend, OrchestratorConfig::default())
///     .with_delegate(Delegate::new("data_analyst", session, router, conversation))
///     .with_store(store);
/// let result = orchestrator.run("Summarize Q4 sales")?;
/// println!("{}", result.output);
/// ```
pub struct Orchestrator {
    backend: SharedBackend,
    config: OrchestratorConfig,
    delegates: Vec<Delegate>,
    store: Option<Arc<dyn InteractionStore>>,
}

impl Orchestrator {
    pub fn new(backend: SharedBackend, config: OrchestratorConfig) -> Self {
        Self {
            backend,
            config,
            delegates: Vec::new(),
            store: None,
        }
    }

    /// Add an agent. Delegates run in the order they were added.
    pub fn with_delegate(mut self, delegate: Delegate) -> Self {
        self.delegates.push(delegate);
        self
    }

    /// Record the plan and final output in `store`.
    pub fn with_store(mut self, store: Arc<dyn InteractionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn delegates(&self) -> impl Iterator<Item = &str> {
        self.delegates.iter().map(Delegate::name)
    }

    /// Run the whole pipeline for `task`. LLM failures in the orchestrator's
    /// own steps abort; a failing delegate is reported and the rest go on.
    pub fn run(&self, task: &str) -> Result<OrchestrationResult> {
        let agents = self.delegates().collect::<Vec<_>>().join(", ");
        tracing::info!(task, agents = %agents, "orchestration started");

        let mut messages = vec![Message::user(format!(
            "Analyze this task and identify what needs to be done:\n\n\
             Task: {task}\n\nAvailable agents: [{agents}]\n\n\
             Provide a brief analysis of what this task requires."
        ))];
        let analysis = self.ask(&messages)?;
        messages.push(Message::assistant(&analysis));

        messages.push(Message::user(format!(
            "Based on the task analysis, create a step-by-step plan for completing:\n\n\
             Task: {task}\nAvailable agents: [{agents}]\n\n\
             Create a detailed execution plan assigning specific steps to agents."
        )));
        let plan = self.ask(&messages)?;
        messages.push(Message::assistant(&plan));
        self.record(format!("Plan: {plan}"), json!({"task": task}));
        tracing::debug!(plan_len = plan.len(), "plan created");

        let reports: Vec<DelegateReport> = self
            .delegates
            .iter()
            .map(|delegate| {
                tracing::info!(agent = %delegate.name, "delegating");
                delegate.run(&format!(
                    "Task: {task}\n\nPlan:\n{plan}\n\nCarry out the steps assigned to {}.",
                    delegate.name
                ))
            })
            .collect();

        let summary = reports
            .iter()
            .map(|r| format!("- {}: {}", r.agent, r.text))
            .collect::<Vec<_>>()
            .join("\n");
        messages.push(Message::user(format!(
            "Aggregate these agent results:\n\n{summary}\n\n\
             Synthesize them into a coherent summary."
        )));
        let output = self.ask(&messages)?;
        self.record(
            format!("Final output: {output}"),
            json!({"task": task, "agent_count": self.delegates.len()}),
        );

        tracing::info!(
            agents = reports.len(),
            failed = reports
                .iter()
                .filter(|r| r.status == DelegateStatus::Failed)
                .count(),
            "orchestration finished"
        );

        Ok(OrchestrationResult {
            analysis,
            plan,
            reports,
            output,
        })
    }

    fn ask(&self, messages: &[Message]) -> Result<String> {
        let reply = self.backend.complete(messages, &[])?;
        Ok(reply.text.unwrap_or_default())
    }

    fn record(&self, content: String, metadata: serde_json::Value) {
        let Some(store) = &self.store else {
            return;
        };
        let record = InteractionRecord::new(&self.config.history_key, Role::Assistant, content)
            .with_metadata(metadata);
        if let Err(e) = store.append(record) {
            tracing::warn!(error = %e, "failed to save orchestration record");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::memory::InMemoryInteractionStore;
    use crate::types::{LlmReply, PendingToolCall};
    use conduit_mcp::{
        ApprovalPolicy, CapabilityDescriptor, Catalog, McpError, MockTransport,
        StaticApprovalHandler, ToolInfo, TransportReply,
    };

    fn calculator() -> (McpSession, InvocationRouter) {
        let session = McpSession::new(MockTransport::new(|req| {
            let args = &req["params"]["arguments"];
            let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
            Ok(TransportReply::body(
                json!({"jsonrpc": "2.0", "id": req["id"],
                       "result": {"content": [{"type": "text", "text": sum.to_string()}]}})
                .to_string(),
            ))
        }));
        let tool: ToolInfo = serde_json::from_value(json!({"name": "add_two_numbers"})).unwrap();
        let router = InvocationRouter::new(
            Catalog::from_descriptors([CapabilityDescriptor::from_tool(&tool)]),
            ApprovalPolicy::none(),
            StaticApprovalHandler::decline_all(),
        );
        (session, router)
    }

    fn delegate(
        name: &str,
        backend: Arc<MockBackend>,
        store: &Arc<dyn InteractionStore>,
    ) -> Delegate {
        let (session, router) = calculator();
        let conversation = ConversationLoop::builder()
            .with_shared_backend(backend)
            .with_store(store.clone(), name)
            .build()
            .unwrap();
        Delegate::new(name, session, router, conversation)
    }

    #[test]
    fn test_pipeline_delegates_and_aggregates() {
        let store: Arc<dyn InteractionStore> = Arc::new(InMemoryInteractionStore::new());
        let math = Arc::new(MockBackend::new(vec![
            LlmReply::calls(vec![PendingToolCall::new(
                "c1",
                "add_two_numbers",
                r#"{"a": 6, "b": 999}"#,
            )]),
            LlmReply::text("6 + 999 = 1005"),
        ]));
        let writer = Arc::new(MockBackend::with_text("Report drafted"));
        let lead = Arc::new(MockBackend::new(vec![
            LlmReply::text("needs arithmetic and a write-up"),
            LlmReply::text("1. calculator adds\n2. writer reports"),
            LlmReply::text("The answer is 1005."),
        ]));

        let orchestrator = Orchestrator::new(lead.clone(), OrchestratorConfig::default())
            .with_delegate(delegate("calculator", math.clone(), &store))
            .with_delegate(delegate("writer", writer.clone(), &store))
            .with_store(store.clone());

        let result = orchestrator.run("What is 6 + 999?").unwrap();

        assert_eq!(result.analysis, "needs arithmetic and a write-up");
        assert_eq!(result.output, "The answer is 1005.");
        assert_eq!(result.reports.len(), 2);
        assert_eq!(result.reports[0].status, DelegateStatus::Completed);
        assert!(result.reports[0].text.contains("1005"));
        assert_eq!(result.reports[1].agent, "writer");

        // Each delegate saw the plan; the aggregation saw each report.
        let first_input = math.requests()[0].messages.last().unwrap().content_str().to_string();
        assert!(first_input.contains("calculator adds"));
        let aggregate = lead.requests()[2].messages.last().unwrap().content_str().to_string();
        assert!(aggregate.contains("- calculator: 6 + 999 = 1005"));
        assert!(aggregate.contains("- writer: Report drafted"));
        assert!(lead.requests().iter().all(|r| r.tool_names.is_empty()));

        // One shared store, separate keys.
        let own = store.history("orchestrator", 10).unwrap();
        assert_eq!(own.len(), 2);
        assert!(own[0].content.starts_with("Plan: "));
        assert_eq!(own[1].metadata["agent_count"], 2);
        assert_eq!(store.history("calculator", 10).unwrap().len(), 2);
        assert_eq!(store.history("writer", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_delegate_is_reported_not_fatal() {
        let store: Arc<dyn InteractionStore> = Arc::new(InMemoryInteractionStore::new());
        let broken = Delegate::new(
            "broken",
            McpSession::new(MockTransport::new(|_| {
                Err(McpError::transport("connection refused"))
            })),
            calculator().1,
            ConversationLoop::builder()
                .with_backend(MockBackend::new(vec![LlmReply::calls(vec![
                    PendingToolCall::new("c1", "add_two_numbers", "{}"),
                ])]))
                .build()
                .unwrap(),
        );
        let lead = Arc::new(MockBackend::new(vec![
            LlmReply::text("analysis"),
            LlmReply::text("plan"),
            LlmReply::text("partial"),
        ]));

        let orchestrator = Orchestrator::new(lead, OrchestratorConfig::default())
            .with_delegate(broken)
            .with_delegate(delegate(
                "writer",
                Arc::new(MockBackend::with_text("done")),
                &store,
            ));

        let result = orchestrator.run("task").unwrap();
        assert_eq!(result.reports[0].status, DelegateStatus::Failed);
        assert!(result.reports[0].text.contains("connection refused"));
        assert_eq!(result.reports[1].status, DelegateStatus::Completed);
        assert_eq!(result.output, "partial");
    }

    #[test]
    fn test_orchestrator_llm_failure_aborts() {
        let orchestrator = Orchestrator::new(
            Arc::new(MockBackend::new(vec![LlmReply::text("analysis")])),
            OrchestratorConfig::default(),
        );
        assert!(orchestrator.run("task").is_err());
    }
}
