//! Reference density curve
//!
//! A fixed population-reference overlay: the normal density with mean 400 ms
//! and standard deviation 30 ms, sampled at 100 points from 300 ms in 2.5 ms
//! steps. The curve does not depend on any computed QTc; callers that want a
//! patient-centered curve must build one themselves.

use std::f64::consts::PI;

use crate::types::DensityPoint;

/// Number of sampled points
pub const CURVE_POINTS: usize = 100;

/// First sampled QTc (ms)
pub const CURVE_START_MS: f64 = 300.0;

/// Sampling step (ms)
pub const CURVE_STEP_MS: f64 = 2.5;

/// Mean of the reference distribution (ms)
pub const REFERENCE_MEAN_MS: f64 = 400.0;

/// Standard deviation of the reference distribution (ms)
pub const REFERENCE_SD_MS: f64 = 30.0;

/// Generate the reference curve
pub fn generate_curve() -> Vec<DensityPoint> {
    (0..CURVE_POINTS)
        .map(|i| {
            let x = CURVE_START_MS + i as f64 * CURVE_STEP_MS;
            DensityPoint {
                qtc: x,
                density: normal_pdf(x, REFERENCE_MEAN_MS, REFERENCE_SD_MS),
            }
        })
        .collect()
}

fn normal_pdf(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    (-0.5 * z * z).exp() / (sd * (2.0 * PI).sqrt())
}
