//! History persistence
//!
//! The history log lives under a single key of a small key-value store and is
//! rewritten in full on every append. Reads favor availability: a missing or
//! unreadable log loads as empty.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::QtcError;
use crate::types::{HistoryEntry, HistoryLog};

/// Schema tag written with every persisted log
pub const HISTORY_SCHEMA: &str = "qtc.history.v1";

/// Minimal key-value storage used for the history log
pub trait KvStore {
    /// Get a value by key; `None` if the key was never written
    fn get(&self, key: &str) -> Result<Option<String>, QtcError>;

    /// Set a value, replacing any previous content
    fn set(&self, key: &str, value: &str) -> Result<(), QtcError>;
}

/// In-memory store, mainly for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    data: RefCell<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, QtcError> {
        Ok(self.data.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), QtcError> {
        self.data
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Directory-backed store: one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    ///
    /// Keys are limited to ASCII letters, digits, `-` and `_` so that distinct
    /// keys always map to distinct files inside `dir`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, QtcError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(QtcError::Config(format!(
                "invalid store key `{key}`: use only letters, digits, `-` and `_`"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, QtcError> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), QtcError> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir)?;
        // Write then rename so a crash never leaves a half-written log
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct PersistedLogRef<'a> {
    schema: &'a str,
    entries: &'a [HistoryEntry],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PersistedLog {
    Versioned {
        schema: String,
        entries: Vec<HistoryEntry>,
    },
    Legacy(Vec<HistoryEntry>),
}

/// History store over a key-value backend
pub struct HistoryStore<S: KvStore> {
    backend: S,
    key: String,
}

impl<S: KvStore> HistoryStore<S> {
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read the persisted log; missing or corrupt data yields an empty log
    pub fn load(&self) -> HistoryLog {
        match self.try_load() {
            Ok(log) => {
                debug!(entries = log.len(), key = %self.key, "history loaded");
                log
            }
            Err(e) => {
                warn!(key = %self.key, error = %e, "history unreadable, starting empty");
                HistoryLog::new()
            }
        }
    }

    /// Read the persisted log, reporting corruption instead of recovering
    pub fn try_load(&self) -> Result<HistoryLog, QtcError> {
        let Some(raw) = self.backend.get(&self.key)? else {
            return Ok(HistoryLog::new());
        };
        decode(&raw)
    }

    /// Add `entry` to `log` and persist the result
    ///
    /// The returned log is the new state. Persistence failures are logged and
    /// do not fail the append.
    pub fn append(&self, log: HistoryLog, entry: HistoryEntry) -> HistoryLog {
        let updated = log.into_appended(entry);
        if let Err(e) = self.persist(&updated) {
            warn!(key = %self.key, error = %e, "failed to persist history");
        }
        updated
    }

    /// Write the full log, replacing prior content
    pub fn persist(&self, log: &HistoryLog) -> Result<(), QtcError> {
        let raw = encode(log)?;
        self.backend.set(&self.key, &raw)?;
        info!(entries = log.len(), key = %self.key, "history persisted");
        Ok(())
    }
}

fn encode(log: &HistoryLog) -> Result<String, QtcError> {
    Ok(serde_json::to_string(&PersistedLogRef {
        schema: HISTORY_SCHEMA,
        entries: log.entries(),
    })?)
}

fn decode(raw: &str) -> Result<HistoryLog, QtcError> {
    let persisted: PersistedLog =
        serde_json::from_str(raw).map_err(|e| QtcError::PersistenceCorrupt(e.to_string()))?;

    match persisted {
        PersistedLog::Versioned { schema, entries } if schema == HISTORY_SCHEMA => {
            Ok(entries.into())
        }
        PersistedLog::Versioned { schema, .. } => Err(QtcError::PersistenceCorrupt(format!(
            "unsupported history schema `{schema}`"
        ))),
        PersistedLog::Legacy(entries) => Ok(entries.into()),
    }
}
