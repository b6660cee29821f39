//! Conversation memory.
//!
//! An [`InteractionStore`] keeps user and assistant messages per history key so
//! a later run can pick up where an earlier one left off. Stores are shared
//! between conversations behind an `Arc` and synchronize internally.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::types::{Message, Role};

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub id: Uuid,
    /// History key (conversation or session name).
    pub key: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl InteractionRecord {
    pub fn new(key: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach free-form metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// The record as a conversation message.
    pub fn to_message(&self) -> Message {
        match self.role {
            Role::Assistant => Message::assistant(&self.content),
            Role::System => Message::system(&self.content),
            _ => Message::user(&self.content),
        }
    }
}

/// Persistence for conversation history.
pub trait InteractionStore: Send + Sync {
    /// Append one record.
    fn append(&self, record: InteractionRecord) -> Result<()>;

    /// The most recent `limit` records for `key`, oldest first.
    fn history(&self, key: &str, limit: usize) -> Result<Vec<InteractionRecord>>;
}

fn tail(mut records: Vec<InteractionRecord>, limit: usize) -> Vec<InteractionRecord> {
    let skip = records.len().saturating_sub(limit);
    records.drain(..skip);
    records
}

// ─────────────────────────────────────────────────────────────────────────────
// In-memory
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryInteractionStore {
    records: Mutex<HashMap<String, Vec<InteractionRecord>>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InteractionStore for InMemoryInteractionStore {
    fn append(&self, record: InteractionRecord) -> Result<()> {
        self.records
            .lock()
            .entry(record.key.clone())
            .or_default()
            .push(record);
        Ok(())
    }

    fn history(&self, key: &str, limit: usize) -> Result<Vec<InteractionRecord>> {
        let records = self.records.lock().get(key).cloned().unwrap_or_default();
        Ok(tail(records, limit))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSONL
// ─────────────────────────────────────────────────────────────────────────────

/// File-backed store writing one JSONL file per history key.
pub struct JsonlInteractionStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonlInteractionStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!(path = %dir.display(), "opened interaction store");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Default location: `<config dir>/conduit/history`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("conduit")
            .join("history")
    }

    /// Root directory of the store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let safe = if safe.is_empty() { "default".to_string() } else { safe };
        self.dir.join(format!("{safe}.jsonl"))
    }
}

impl InteractionStore for JsonlInteractionStore {
    fn append(&self, record: InteractionRecord) -> Result<()> {
        let line = serde_json::to_string(&record)?;
        let path = self.file_for(&record.key);

        let _guard = self.lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        tracing::debug!(
            key = %record.key,
            role = record.role.as_str(),
            path = %path.display(),
            "interaction saved"
        );
        Ok(())
    }

    fn history(&self, key: &str, limit: usize) -> Result<Vec<InteractionRecord>> {
        let path = self.file_for(key);

        let _guard = self.lock.lock();
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<InteractionRecord>(&line) {
                // Keys that sanitize to the same file are told apart here.
                Ok(record) if record.key == key => records.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        line = lineno + 1,
                        error = %e,
                        "skipping corrupt interaction record"
                    );
                }
            }
        }
        Ok(tail(records, limit))
    }
}

impl std::fmt::Debug for JsonlInteractionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonlInteractionStore")
            .field("dir", &self.dir)
            .finish()
    }
}

/// Check that a store directory is usable.
pub fn ensure_writable(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let marker = dir.join(".write-test");
    fs::write(&marker, b"")
        .and_then(|_| fs::remove_file(&marker))
        .map_err(|e| AgentError::storage(format!("{} is not writable: {}", dir.display(), e)))
}
