//! Input normalization
//!
//! This module converts raw user input into canonical units:
//! - QT in milliseconds (small grid squares are 40 ms each)
//! - RR in seconds, heart rate in bpm (passed through after validation)

use crate::error::QtcError;
use crate::types::{Measurement, NormalizedMeasurement, QtUnit, MS_PER_SMALL_SQUARE};

/// Normalizer for converting raw measurements to canonical units
pub struct Normalizer;

impl Normalizer {
    /// Convert a raw QT value to milliseconds
    pub fn normalize(qt_raw: f64, qt_unit: QtUnit) -> f64 {
        match qt_unit {
            QtUnit::Milliseconds => qt_raw,
            QtUnit::SmallSquares => qt_raw * MS_PER_SMALL_SQUARE,
        }
    }

    /// Same as [`Normalizer::normalize`] for a unit tag that has not been parsed yet
    pub fn normalize_tagged(qt_raw: f64, qt_unit: &str) -> Result<f64, QtcError> {
        let unit = qt_unit.parse::<QtUnit>()?;
        Ok(Self::normalize(qt_raw, unit))
    }

    /// Validate a measurement and convert it to canonical units
    pub fn normalize_measurement(
        measurement: &Measurement,
    ) -> Result<NormalizedMeasurement, QtcError> {
        let normalized = NormalizedMeasurement {
            qt_ms: Self::normalize(measurement.qt_raw, measurement.qt_unit),
            heart_rate: measurement.heart_rate,
            rr_seconds: measurement.rr_interval,
            formula: measurement.formula,
        };
        normalized.validate()?;
        Ok(normalized)
    }
}
