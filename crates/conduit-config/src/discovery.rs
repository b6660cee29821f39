//! Where config files live and how their layers combine.
//!
//! Two layers, later sections replacing earlier ones:
//! 1. `<config dir>/config.toml` (`--config-dir`, `CONDUIT_CONFIG_DIR`, or platform default)
//! 2. `conduit.toml` in the working directory
//!
//! Command-line flags are applied by the binary on top of the result.

use std::path::{Path, PathBuf};

use crate::{ConduitConfig, ConfigError, Result};

const USER_CONFIG_FILE: &str = "config.toml";
const PROJECT_CONFIG_FILE: &str = "conduit.toml";
const CONFIG_DIR_ENV: &str = "CONDUIT_CONFIG_DIR";

/// The merged configuration and what went into it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ConduitConfig,
    /// Files that existed and were merged, lowest precedence first.
    pub loaded: Vec<PathBuf>,
    /// Problems worth telling the user about that do not stop loading.
    pub warnings: Vec<String>,
}

/// The user config directory: `CONDUIT_CONFIG_DIR` when set and non-empty,
/// otherwise `<platform config dir>/conduit`.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("conduit")),
    }
}

/// Merge the user layer from `config_dir` (if any) and the project layer
/// from `project_dir`. Missing files are skipped; unreadable or malformed
/// ones are errors.
pub fn load_config(config_dir: Option<&Path>, project_dir: &Path) -> Result<LoadedConfig> {
    let candidates = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .into_iter()
        .chain([project_dir.join(PROJECT_CONFIG_FILE)]);

    let mut config = ConduitConfig::new();
    let mut loaded = Vec::new();
    for path in candidates {
        let Some(layer) = read_layer(&path)? else {
            tracing::debug!(path = %path.display(), "config layer absent");
            continue;
        };
        tracing::debug!(path = %path.display(), "config layer merged");
        config.merge(layer);
        loaded.push(path);
    }

    let mut warnings = Vec::new();
    if config.llm.as_ref().is_some_and(|llm| llm.has_plaintext_api_key()) {
        warnings.push(
            "[llm] contains a plaintext API key; prefer the environment variable".to_string(),
        );
    }

    Ok(LoadedConfig {
        config,
        loaded,
        warnings,
    })
}

fn read_layer(path: &Path) -> Result<Option<ConduitConfig>> {
    if !path.is_file() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&contents)
        .map(Some)
        .map_err(|source| ConfigError::ParseFile {
            path: path.display().to_string(),
            source,
        })
}
