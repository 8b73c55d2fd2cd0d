//! QTc Engine - rate-corrected QT interval computation with local history
//!
//! A measurement flows through a deterministic pipeline:
//! normalization → QTc computation (remote service or in-process) → history append.
//! A fixed reference density curve is produced alongside each result.
//!
//! ## Modules
//!
//! - **Normalizer**: QT in milliseconds or small grid squares → milliseconds
//! - **Engine**: Bazett, Fridericia, Framingham and Hodges corrections via a [`QtcService`]
//! - **History**: append-only log persisted in a key-value store
//! - **Session**: explicit application state and computation state machine

pub mod client;
pub mod config;
pub mod curve;
pub mod engine;
pub mod error;
pub mod formula;
pub mod history;
pub mod normalizer;
pub mod session;
pub mod types;

pub use client::{HttpQtcService, LocalQtcService, QtcService};
pub use config::QtcConfig;
pub use curve::generate_curve;
pub use engine::QtcEngine;
pub use error::QtcError;
pub use history::{FileKvStore, HistoryStore, KvStore, MemoryKvStore, HISTORY_SCHEMA};
pub use normalizer::Normalizer;
pub use session::{AppState, Phase, QtcSession};
pub use types::{
    DensityPoint, Formula, HistoryEntry, HistoryLog, Measurement, NormalizedMeasurement, QtUnit,
    QtcRequest, QtcResult,
};

/// Engine version reported by the CLI
pub const QTC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "qtc-engine";
