//! Core types for the QTc engine
//!
//! This module defines the data structures that flow through each stage:
//! raw measurement, normalized measurement, service request/response, the
//! reference density curve and the persisted history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::QtcError;

/// Milliseconds represented by one small ECG grid square at 25 mm/s
pub const MS_PER_SMALL_SQUARE: f64 = 40.0;

/// Unit the QT interval was read in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QtUnit {
    Milliseconds,
    SmallSquares,
}

impl QtUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            QtUnit::Milliseconds => "milliseconds",
            QtUnit::SmallSquares => "small_squares",
        }
    }
}

impl FromStr for QtUnit {
    type Err = QtcError;

    /// Accepts the canonical tags plus the French form labels
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ms" | "milliseconds" | "Milliseconds" | "Millisecondes" => Ok(QtUnit::Milliseconds),
            "squares" | "small_squares" | "SmallSquares" | "Petits carreaux" => {
                Ok(QtUnit::SmallSquares)
            }
            other => Err(QtcError::InvalidUnit(other.to_string())),
        }
    }
}

impl fmt::Display for QtUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published QT correction formula
///
/// Serialized with the exact names the computation service expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Formula {
    Bazett,
    Fridericia,
    Framingham,
    Hodges,
}

impl Formula {
    pub const ALL: [Formula; 4] = [
        Formula::Bazett,
        Formula::Fridericia,
        Formula::Framingham,
        Formula::Hodges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Formula::Bazett => "Bazett",
            Formula::Fridericia => "Fridericia",
            Formula::Framingham => "Framingham",
            Formula::Hodges => "Hodges",
        }
    }
}

impl FromStr for Formula {
    type Err = QtcError;

    /// Exact, case-sensitive match against the four formula names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Formula::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| QtcError::UnknownFormula(s.to_string()))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw user input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// QT value in `qt_unit`
    pub qt_raw: f64,
    pub qt_unit: QtUnit,
    /// Heart rate (bpm)
    pub heart_rate: f64,
    /// RR interval (seconds)
    pub rr_interval: f64,
    pub formula: Formula,
}

impl Measurement {
    /// Build a measurement from form fields, parsing the unit and formula names
    pub fn from_form(
        qt_raw: f64,
        qt_unit: &str,
        heart_rate: f64,
        rr_interval: f64,
        formula: &str,
    ) -> Result<Self, QtcError> {
        Ok(Self {
            qt_raw,
            qt_unit: qt_unit.parse()?,
            heart_rate,
            rr_interval,
            formula: formula.parse()?,
        })
    }
}

/// Measurement in canonical units (QT in ms, RR in s)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMeasurement {
    pub qt_ms: f64,
    pub heart_rate: f64,
    pub rr_seconds: f64,
    pub formula: Formula,
}

impl NormalizedMeasurement {
    /// Reject values the correction formulas are undefined for
    pub fn validate(&self) -> Result<(), QtcError> {
        let fields = [
            ("qt", self.qt_ms),
            ("heart rate", self.heart_rate),
            ("rr interval", self.rr_seconds),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(QtcError::InvalidMeasurement(format!(
                    "{name} must be a finite number, got {value}"
                )));
            }
        }

        if self.qt_ms < 0.0 {
            return Err(QtcError::InvalidMeasurement(format!(
                "qt must be >= 0, got {}",
                self.qt_ms
            )));
        }
        if self.heart_rate <= 0.0 {
            return Err(QtcError::InvalidMeasurement(format!(
                "heart rate must be > 0, got {}",
                self.heart_rate
            )));
        }
        // Zero or negative RR would divide by zero / take a negative root in Bazett and Fridericia
        if self.rr_seconds <= 0.0 {
            return Err(QtcError::InvalidMeasurement(format!(
                "rr interval must be > 0, got {}",
                self.rr_seconds
            )));
        }

        Ok(())
    }
}

/// Body of `POST /calculate_qtc`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QtcRequest {
    /// QT (ms)
    pub qt: f64,
    /// Heart rate (bpm)
    pub fc: f64,
    /// RR interval (s)
    pub rr: f64,
    pub method: Formula,
}

impl From<&NormalizedMeasurement> for QtcRequest {
    fn from(m: &NormalizedMeasurement) -> Self {
        Self {
            qt: m.qt_ms,
            fc: m.heart_rate,
            rr: m.rr_seconds,
            method: m.formula,
        }
    }
}

/// Result of a QTc computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QtcResult {
    /// Corrected QT (ms)
    pub qtc: f64,
}

/// One point of the reference density curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityPoint {
    pub qtc: f64,
    pub density: f64,
}

/// A single recorded computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Normalized QT (ms)
    pub qt: f64,
    /// Heart rate (bpm)
    pub fc: f64,
    /// RR interval (s)
    pub rr: f64,
    pub method: Formula,
    pub qtc: f64,
    /// When the computation completed; absent in legacy records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn new(measurement: &NormalizedMeasurement, result: QtcResult) -> Self {
        Self {
            qt: measurement.qt_ms,
            fc: measurement.heart_rate,
            rr: measurement.rr_seconds,
            method: measurement.formula,
            qtc: result.qtc,
            recorded_at: Some(Utc::now()),
        }
    }
}

/// Ordered, append-only sequence of history entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new log with `entry` added at the end; `self` is unchanged
    pub fn append(&self, entry: HistoryEntry) -> HistoryLog {
        self.clone().into_appended(entry)
    }

    /// Consume the log and return it with `entry` added at the end
    ///
    /// No copy of the existing entries is made.
    pub fn into_appended(mut self, entry: HistoryEntry) -> HistoryLog {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }
}

impl From<Vec<HistoryEntry>> for HistoryLog {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(qtc: f64) -> HistoryEntry {
        HistoryEntry {
            qt: 360.0,
            fc: 75.0,
            rr: 0.8,
            method: Formula::Bazett,
            qtc,
            recorded_at: None,
        }
    }

    #[test]
    fn test_formula_exact_match() {
        assert_eq!("Bazett".parse::<Formula>().unwrap(), Formula::Bazett);
        assert_eq!("Hodges".parse::<Formula>().unwrap(), Formula::Hodges);
        assert!(matches!(
            "bazett".parse::<Formula>(),
            Err(QtcError::UnknownFormula(_))
        ));
        assert!(matches!(
            "Sagie".parse::<Formula>(),
            Err(QtcError::UnknownFormula(name)) if name == "Sagie"
        ));
    }

    #[test]
    fn test_unit_labels() {
        assert_eq!("ms".parse::<QtUnit>().unwrap(), QtUnit::Milliseconds);
        assert_eq!("Millisecondes".parse::<QtUnit>().unwrap(), QtUnit::Milliseconds);
        assert_eq!("Petits carreaux".parse::<QtUnit>().unwrap(), QtUnit::SmallSquares);
        assert!(matches!("mm".parse::<QtUnit>(), Err(QtcError::InvalidUnit(_))));
    }

    #[test]
    fn test_request_wire_shape() {
        let request = QtcRequest::from(&NormalizedMeasurement {
            qt_ms: 360.0,
            heart_rate: 75.0,
            rr_seconds: 0.8,
            formula: Formula::Fridericia,
        });
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "qt": 360.0, "fc": 75.0, "rr": 0.8, "method": "Fridericia" })
        );
    }

    #[test]
    fn test_append_leaves_previous_log_untouched() {
        let empty = HistoryLog::new();
        let one = empty.append(entry(400.0));
        let two = one.append(entry(410.0));

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(two.entries()[0].qtc, 400.0);
        assert_eq!(two.last().map(|e| e.qtc), Some(410.0));
    }

    #[test]
    fn test_into_appended_reuses_storage() {
        let log = HistoryLog::from(Vec::with_capacity(4)).into_appended(entry(400.0));
        let first = log.entries().as_ptr();

        let log = log.into_appended(entry(410.0)).into_appended(entry(420.0));
        assert_eq!(log.entries().as_ptr(), first);
        let qtcs: Vec<f64> = log.iter().map(|e| e.qtc).collect();
        assert_eq!(qtcs, vec![400.0, 410.0, 420.0]);
    }

    #[test]
    fn test_from_form_parses_names() {
        let m = Measurement::from_form(9.0, "Petits carreaux", 90.0, 0.667, "Hodges").unwrap();
        assert_eq!(m.qt_unit, QtUnit::SmallSquares);
        assert_eq!(m.formula, Formula::Hodges);

        assert!(matches!(
            Measurement::from_form(360.0, "ms", 75.0, 0.8, "Sagie"),
            Err(QtcError::UnknownFormula(_))
        ));
        assert!(matches!(
            Measurement::from_form(360.0, "mm", 75.0, 0.8, "Bazett"),
            Err(QtcError::InvalidUnit(_))
        ));
    }

    #[test]
    fn test_validate_rejects_undefined_inputs() {
        let ok = NormalizedMeasurement {
            qt_ms: 0.0,
            heart_rate: 75.0,
            rr_seconds: 0.8,
            formula: Formula::Framingham,
        };
        assert!(ok.validate().is_ok());

        for bad in [
            NormalizedMeasurement { rr_seconds: -0.5, ..ok },
            NormalizedMeasurement { rr_seconds: 0.0, ..ok },
            NormalizedMeasurement { heart_rate: -10.0, ..ok },
            NormalizedMeasurement { qt_ms: -1.0, ..ok },
            NormalizedMeasurement { qt_ms: f64::INFINITY, ..ok },
        ] {
            assert!(matches!(bad.validate(), Err(QtcError::InvalidMeasurement(_))));
        }
    }

    #[test]
    fn test_legacy_entry_without_timestamp() {
        let json = r#"{"qt":360,"fc":75,"rr":0.8,"method":"Bazett","qtc":402.49}"#;
        let parsed: HistoryEntry = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.recorded_at, None);
        assert_eq!(serde_json::to_string(&parsed).unwrap().contains("recorded_at"), false);
    }
}
