//! API key resolution.
//!
//! Resolution order:
//! 1. Value given explicitly (CLI flag or `api_key` in the config file)
//! 2. Environment variable named by `api_key_env`

use crate::{ConfigError, LlmConfig, Result};

/// Result of API key resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    Explicit,
    EnvVar(String),
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Explicit => write!(f, "config"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
        }
    }
}

/// Resolve the LLM API key, reading the environment through `lookup`.
pub fn resolve_api_key_with(
    llm: &LlmConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedSecret> {
    if let Some(value) = llm.api_key.as_deref().filter(|v| !v.is_empty()) {
        return Ok(ResolvedSecret {
            value: value.to_string(),
            source: SecretSource::Explicit,
        });
    }

    if let Some(value) = lookup(&llm.api_key_env).filter(|v| !v.is_empty()) {
        return Ok(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(llm.api_key_env.clone()),
        });
    }

    Err(ConfigError::ApiKeyNotFound {
        env_var: llm.api_key_env.clone(),
    })
}

/// Resolve the LLM API key from the config and the process environment.
pub fn resolve_api_key(llm: &LlmConfig) -> Result<ResolvedSecret> {
    resolve_api_key_with(llm, |var| std::env::var(var).ok())
}
