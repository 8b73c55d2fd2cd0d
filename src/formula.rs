//! QT correction formulas
//!
//! Closed-form evaluation of the four published corrections. The computation
//! service implements the same semantics; this module backs the in-process
//! service and serves as the reference for response checks.

use crate::types::{Formula, NormalizedMeasurement};

/// Framingham linear regression slope (ms per second of RR)
const FRAMINGHAM_SLOPE: f64 = 154.0;

/// Hodges linear regression slope (ms per bpm)
const HODGES_SLOPE: f64 = 1.75;

/// Heart rate at which Hodges applies no correction (bpm)
const HODGES_REFERENCE_HR: f64 = 60.0;

impl Formula {
    /// Compute QTc (ms) from QT (ms), heart rate (bpm) and RR (s)
    pub fn apply(&self, qt_ms: f64, heart_rate: f64, rr_seconds: f64) -> f64 {
        match self {
            Formula::Bazett => qt_ms / rr_seconds.sqrt(),
            Formula::Fridericia => qt_ms / rr_seconds.cbrt(),
            Formula::Framingham => qt_ms + FRAMINGHAM_SLOPE * (1.0 - rr_seconds),
            Formula::Hodges => qt_ms + HODGES_SLOPE * (heart_rate - HODGES_REFERENCE_HR),
        }
    }
}

/// Evaluate the measurement's formula locally
pub fn evaluate(measurement: &NormalizedMeasurement) -> f64 {
    measurement.formula.apply(
        measurement.qt_ms,
        measurement.heart_rate,
        measurement.rr_seconds,
    )
}
