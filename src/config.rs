//! Engine configuration
//!
//! Layered as defaults, then an optional JSON file, then `QTC_*` environment
//! overrides. Out-of-range environment values are ignored.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::QtcError;

/// Default computation service host
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000";

/// Default key the history log is stored under
pub const DEFAULT_HISTORY_KEY: &str = "qtcHistory";

/// Configuration for the computation client and history store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QtcConfig {
    /// Base URL of the computation service
    pub endpoint: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Attempts per computation, including the first
    pub max_attempts: u32,
    /// Initial backoff between attempts, doubled per retry
    pub retry_backoff_ms: u64,
    /// Directory of the file key-value store
    pub history_dir: PathBuf,
    pub history_key: String,
}

impl Default for QtcConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connect_timeout_ms: 3_000,
            request_timeout_ms: 5_000,
            max_attempts: 3,
            retry_backoff_ms: 200,
            history_dir: PathBuf::from(".qtc"),
            history_key: DEFAULT_HISTORY_KEY.to_string(),
        }
    }
}

impl QtcConfig {
    /// Load from an optional JSON file and apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, QtcError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Read a JSON config file; missing fields keep their defaults
    pub fn from_file(path: &Path) -> Result<Self, QtcError> {
        let content = fs::read_to_string(path).map_err(|e| {
            QtcError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
            .map_err(|e| QtcError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Apply `QTC_*` environment variables on top of the current values
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = var("QTC_ENDPOINT")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            self.endpoint = endpoint;
        }
        if let Some(ms) = parse_in_range(var("QTC_CONNECT_TIMEOUT_MS"), 100..=60_000) {
            self.connect_timeout_ms = ms;
        }
        if let Some(ms) = parse_in_range(var("QTC_REQUEST_TIMEOUT_MS"), 100..=120_000) {
            self.request_timeout_ms = ms;
        }
        if let Some(n) = parse_in_range(var("QTC_MAX_ATTEMPTS"), 1..=10) {
            self.max_attempts = n as u32;
        }
        if let Some(dir) = var("QTC_HISTORY_DIR").filter(|v| !v.trim().is_empty()) {
            self.history_dir = PathBuf::from(dir);
        }
        self
    }

    /// Full URL of the QTc RPC
    pub fn calculate_url(&self) -> String {
        format!("{}/calculate_qtc", self.endpoint.trim_end_matches('/'))
    }
}

fn parse_in_range(value: Option<String>, range: std::ops::RangeInclusive<u64>) -> Option<u64> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| range.contains(v))
}
