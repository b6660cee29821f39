//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [server]      # MCP endpoint
//! [llm]         # OpenAI-compatible backend
//! [agent]       # conversation loop
//! [approval]    # human approval gate
//! [memory]      # conversation history
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default MCP endpoint.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:9000/mcp";

/// Default environment variable holding the LLM API key.
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged. Use the accessors to get a section
/// with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub server: Option<ServerConfig>,
    pub llm: Option<LlmConfig>,
    pub agent: Option<AgentSection>,
    pub approval: Option<ApprovalConfig>,
    pub memory: Option<MemoryConfig>,
}

impl ConduitConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, not field by field.
    pub fn merge(&mut self, other: ConduitConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.llm.is_some() {
            self.llm = other.llm;
        }
        if other.agent.is_some() {
            self.agent = other.agent;
        }
        if other.approval.is_some() {
            self.approval = other.approval;
        }
        if other.memory.is_some() {
            self.memory = other.memory;
        }
    }

    pub fn server(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }

    pub fn llm(&self) -> LlmConfig {
        self.llm.clone().unwrap_or_default()
    }

    pub fn agent(&self) -> AgentSection {
        self.agent.clone().unwrap_or_default()
    }

    pub fn approval(&self) -> ApprovalConfig {
        self.approval.clone().unwrap_or_default()
    }

    pub fn memory(&self) -> MemoryConfig {
        self.memory.clone().unwrap_or_default()
    }

    /// Check values that parse but cannot be used.
    pub fn validate(&self) -> Result<()> {
        let server = self.server();
        if server.url.trim().is_empty() {
            return Err(ConfigError::invalid("server.url", "must not be empty"));
        }
        if server.timeout_secs == 0 {
            return Err(ConfigError::invalid("server.timeout_secs", "must be positive"));
        }
        if self.llm().timeout_secs == 0 {
            return Err(ConfigError::invalid("llm.timeout_secs", "must be positive"));
        }
        if let Some(t) = self.llm().temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::invalid(
                "llm.temperature",
                format!("{t} is outside 0.0..=2.0"),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// MCP server connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Endpoint URL; every request is a POST here.
    pub url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries on connection failure.
    pub retries: u32,
    /// Extra headers sent with every request, as `[name, value]` pairs.
    pub headers: Vec<(String, String)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SERVER_URL.to_string(),
            timeout_secs: 30,
            retries: 3,
            headers: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// LLM backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Custom API base URL (proxies, local OpenAI-compatible servers).
    pub base_url: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// API key (prefer the environment variable).
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            timeout_secs: 120,
            max_tokens: None,
            temperature: None,
        }
    }
}

impl LlmConfig {
    /// Returns true if an API key is stored directly in the config file.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Conversation loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Overrides the built-in system prompt.
    pub system_prompt: Option<String>,
    /// Tool-call rounds allowed per user input.
    pub max_iterations: u32,
    /// Stored messages loaded before each run.
    pub history_limit: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: 5,
            history_limit: 10,
        }
    }
}

/// How approval prompts are answered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Ask on the terminal.
    #[default]
    Prompt,
    /// Approve everything without asking.
    Accept,
    /// Decline everything without asking.
    Decline,
}

/// Human approval gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub mode: ApprovalMode,
    /// Operations that always need approval.
    pub sensitive_tools: Vec<String>,
    /// Also gate operations the server flags as needing approval.
    pub honor_annotations: bool,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            mode: ApprovalMode::Prompt,
            sensitive_tools: vec!["get_user_info".to_string()],
            honor_annotations: true,
        }
    }
}

/// Conversation history persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Store directory; defaults to `<config dir>/history`.
    pub path: Option<PathBuf>,
}
