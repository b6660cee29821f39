//! CLI command handlers.

pub mod ask;
pub mod call;
pub mod chat;
pub mod repl;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use conduit_agent::{
    ConversationLoop, DEFAULT_SYSTEM_PROMPT, InteractionStore, JsonlInteractionStore, LoopConfig,
    OpenAiBackend, OpenAiConfig, memory,
};
use conduit_config::{ApprovalMode, ConduitConfig};
use conduit_mcp::{
    ApprovalPolicy, Catalog, HttpTransportConfig, InvocationRouter, McpSession,
    StaticApprovalHandler,
};
use console::Style;

use crate::approval::ConsoleApprovalHandler;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: ConduitConfig,
    /// User config directory (logs, history).
    pub config_dir: Option<PathBuf>,
    /// MCP endpoint to connect to.
    pub server_url: String,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Open and initialize a session with the MCP server.
    pub fn connect(&self) -> Result<McpSession> {
        let server = self.config.server();
        let mut transport = HttpTransportConfig::new(&self.server_url)
            .with_timeout(server.timeout())
            .with_retries(server.retries);
        for (name, value) in &server.headers {
            transport = transport.with_header(name, value);
        }

        let session = McpSession::connect_http(transport)?;
        session
            .initialize()
            .with_context(|| format!("failed to initialize MCP session with {}", self.server_url))?;

        if self.verbose && !self.json_output {
            let dim = Style::new().dim();
            let server = session
                .server_info()
                .map(|s| format!("{} {}", s.name, s.version))
                .unwrap_or_else(|| "unknown server".to_string());
            eprintln!(
                "{}",
                dim.apply_to(format!(
                    "Connected to {} ({}), session {}",
                    self.server_url,
                    server,
                    session.session_id().as_deref().unwrap_or("none")
                ))
            );
        }
        Ok(session)
    }

    /// Discover capabilities and wrap them in a router with the configured
    /// approval gate.
    pub fn router(&self, session: &McpSession) -> Result<InvocationRouter> {
        let catalog = Catalog::refresh(session).context("capability discovery failed")?;
        for collision in catalog.collisions() {
            tracing::warn!(
                name = %collision.name,
                replaced = ?collision.replaced,
                winner = ?collision.winner,
                "duplicate capability name"
            );
        }

        let approval = self.config.approval();
        let policy = ApprovalPolicy::new(approval.sensitive_tools.iter().cloned())
            .with_annotations(approval.honor_annotations);

        Ok(match approval.mode {
            ApprovalMode::Prompt => {
                InvocationRouter::new(catalog, policy, ConsoleApprovalHandler::new())
            }
            ApprovalMode::Accept => {
                InvocationRouter::new(catalog, policy, StaticApprovalHandler::accept_all())
            }
            ApprovalMode::Decline => {
                InvocationRouter::new(catalog, policy, StaticApprovalHandler::decline_all())
            }
        })
    }

    /// Build the conversation loop from the `[llm]`, `[agent]` and `[memory]`
    /// sections.
    pub fn conversation(
        &self,
        history_key: &str,
        max_iterations: Option<u32>,
        show_tools: bool,
    ) -> Result<ConversationLoop> {
        let llm = self.config.llm();
        let secret = conduit_config::resolve_api_key(&llm)?;
        tracing::debug!(source = %secret.source, "resolved LLM API key");

        let mut backend_config = OpenAiConfig::openai(secret.value).with_timeout(llm.timeout());
        if let Some(url) = &llm.base_url {
            backend_config = backend_config.with_base_url(url);
        }
        if let Some(model) = &llm.model {
            backend_config = backend_config.with_model(model);
        }
        if let Some(max_tokens) = llm.max_tokens {
            backend_config = backend_config.with_max_tokens(max_tokens);
        }
        if let Some(temperature) = llm.temperature {
            backend_config = backend_config.with_temperature(temperature);
        }

        let agent = self.config.agent();
        let loop_config = LoopConfig {
            system_prompt: agent
                .system_prompt
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_iterations: max_iterations.unwrap_or(agent.max_iterations),
            history_limit: agent.history_limit,
            history_key: history_key.to_string(),
        };

        let mut builder = ConversationLoop::builder()
            .with_backend(OpenAiBackend::new(backend_config)?)
            .with_config(loop_config);

        if let Some(store) = self.history_store()? {
            builder = builder.with_store(store, history_key);
        }

        if show_tools && !self.json_output {
            builder = builder.with_observer(|call, result| {
                let dim = Style::new().dim();
                let status = if result.is_success() { "done" } else { "failed" };
                eprintln!("{}", dim.apply_to(format!("[{}: {}]", call.name, status)));
            });
        }

        Ok(builder.build()?)
    }

    fn history_store(&self) -> Result<Option<Arc<dyn InteractionStore>>> {
        let memory_config = self.config.memory();
        if !memory_config.enabled {
            return Ok(None);
        }
        let dir = memory_config
            .path
            .or_else(|| self.config_dir.as_ref().map(|d| d.join("history")))
            .unwrap_or_else(JsonlInteractionStore::default_path);
        memory::ensure_writable(&dir)?;
        Ok(Some(Arc::new(JsonlInteractionStore::open(dir)?)))
    }
}
