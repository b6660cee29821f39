//! Configuration system for Conduit.
//!
//! Provides TOML-based configuration with:
//! - One section per concern (`[server]`, `[llm]`, `[agent]`, `[approval]`, `[memory]`)
//! - Config file layering (user config dir + project-local `conduit.toml`)
//! - API key resolution (explicit value → env var)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{LoadedConfig, load_config, user_config_dir};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_api_key, resolve_api_key_with};
pub use types::*;
