//! Error types for the QTc engine

use thiserror::Error;

/// Errors that can occur while normalizing, computing or persisting a QTc
#[derive(Debug, Error)]
pub enum QtcError {
    #[error("Invalid QT unit: {0}")]
    InvalidUnit(String),

    #[error("Unknown correction formula: {0}")]
    UnknownFormula(String),

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(String),

    #[error("QTc computation unavailable: {0}")]
    ComputationUnavailable(String),

    #[error("History data is corrupt: {0}")]
    PersistenceCorrupt(String),

    #[error("A computation is already in flight")]
    Busy,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl QtcError {
    /// Whether this error stems from local input validation, i.e. it was raised
    /// before any request left the process.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            QtcError::InvalidUnit(_) | QtcError::UnknownFormula(_) | QtcError::InvalidMeasurement(_)
        )
    }
}
