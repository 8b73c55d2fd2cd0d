//! QTc engine
//!
//! Builds the service request from a normalized measurement, delegates the
//! computation to a [`QtcService`] and unwraps the response. Also exposes the
//! reference density curve, which is computed locally.

use tracing::{debug, info};

use crate::client::{HttpQtcService, LocalQtcService, QtcService};
use crate::config::QtcConfig;
use crate::curve;
use crate::error::QtcError;
use crate::types::{DensityPoint, Formula, NormalizedMeasurement, QtcRequest, QtcResult};

/// Engine parameterized over the computation backend
pub struct QtcEngine<C: QtcService> {
    service: C,
}

impl QtcEngine<HttpQtcService> {
    /// Engine talking to the configured computation service
    pub fn remote(config: &QtcConfig) -> Self {
        Self::new(HttpQtcService::new(config))
    }
}

impl QtcEngine<LocalQtcService> {
    /// Engine evaluating formulas in-process
    pub fn local() -> Self {
        Self::new(LocalQtcService)
    }
}

impl<C: QtcService> QtcEngine<C> {
    pub fn new(service: C) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &C {
        &self.service
    }

    /// Compute QTc (ms) for a normalized measurement
    ///
    /// Values outside the domain of the formulas fail with
    /// [`QtcError::InvalidMeasurement`] before any request is made.
    pub fn compute_qtc(&self, measurement: &NormalizedMeasurement) -> Result<QtcResult, QtcError> {
        measurement.validate()?;
        let request = QtcRequest::from(measurement);
        debug!(
            qt = request.qt,
            fc = request.fc,
            rr = request.rr,
            method = %request.method,
            "computing QTc"
        );

        let result = self.service.calculate(&request)?;
        info!(method = %request.method, qtc = result.qtc, "QTc computed");
        Ok(result)
    }

    /// Compute QTc with the formula given by name
    ///
    /// The name and values are checked before any request is made, so an
    /// unknown formula or an out-of-domain value never reaches the service.
    pub fn compute_qtc_named(
        &self,
        qt_ms: f64,
        heart_rate: f64,
        rr_seconds: f64,
        formula: &str,
    ) -> Result<QtcResult, QtcError> {
        let formula: Formula = formula.parse()?;
        self.compute_qtc(&NormalizedMeasurement {
            qt_ms,
            heart_rate,
            rr_seconds,
            formula,
        })
    }

    /// The fixed reference density curve
    pub fn generate_curve(&self) -> Vec<DensityPoint> {
        curve::generate_curve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Counts calls and answers with a fixed value
    struct CountingService {
        calls: Cell<usize>,
        answer: Result<f64, &'static str>,
    }

    impl QtcService for CountingService {
        fn calculate(&self, _request: &QtcRequest) -> Result<QtcResult, QtcError> {
            self.calls.set(self.calls.get() + 1);
            self.answer
                .map(|qtc| QtcResult { qtc })
                .map_err(|msg| QtcError::ComputationUnavailable(msg.to_string()))
        }
    }

    #[test]
    fn test_local_engine_bazett() {
        let engine = QtcEngine::local();
        let result = engine
            .compute_qtc(&NormalizedMeasurement {
                qt_ms: 360.0,
                heart_rate: 75.0,
                rr_seconds: 0.8,
                formula: Formula::Bazett,
            })
            .unwrap();
        assert!((result.qtc - 402.49).abs() < 0.01);
    }

    #[test]
    fn test_unknown_formula_never_reaches_service() {
        let engine = QtcEngine::new(CountingService {
            calls: Cell::new(0),
            answer: Ok(400.0),
        });

        let err = engine.compute_qtc_named(360.0, 75.0, 0.8, "Sagie").unwrap_err();
        assert!(matches!(err, QtcError::UnknownFormula(name) if name == "Sagie"));
        assert_eq!(engine.service().calls.get(), 0);
    }

    #[test]
    fn test_out_of_domain_values_never_reach_service() {
        let engine = QtcEngine::new(CountingService {
            calls: Cell::new(0),
            answer: Ok(400.0),
        });

        let err = engine
            .compute_qtc_named(360.0, 75.0, -0.5, "Framingham")
            .unwrap_err();
        assert!(matches!(err, QtcError::InvalidMeasurement(_)));

        let err = engine.compute_qtc_named(360.0, -10.0, 0.8, "Hodges").unwrap_err();
        assert!(matches!(err, QtcError::InvalidMeasurement(_)));

        let err = engine
            .compute_qtc(&NormalizedMeasurement {
                qt_ms: 360.0,
                heart_rate: 75.0,
                rr_seconds: f64::NAN,
                formula: Formula::Fridericia,
            })
            .unwrap_err();
        assert!(matches!(err, QtcError::InvalidMeasurement(_)));

        assert_eq!(engine.service().calls.get(), 0);
    }

    #[test]
    fn test_zero_rr_is_invalid_not_unavailable() {
        let err = QtcEngine::local()
            .compute_qtc_named(360.0, 75.0, 0.0, "Bazett")
            .unwrap_err();
        assert!(matches!(err, QtcError::InvalidMeasurement(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_service_failure_surfaces() {
        let engine = QtcEngine::new(CountingService {
            calls: Cell::new(0),
            answer: Err("connection refused"),
        });

        let err = engine.compute_qtc_named(360.0, 75.0, 0.8, "Hodges").unwrap_err();
        assert!(matches!(err, QtcError::ComputationUnavailable(_)));
        assert_eq!(engine.service().calls.get(), 1);
    }

    #[test]
    fn test_curve_is_independent_of_result() {
        let engine = QtcEngine::local();
        let before = engine.generate_curve();
        engine.compute_qtc_named(500.0, 120.0, 0.5, "Bazett").unwrap();
        assert_eq!(engine.generate_curve(), before);
    }
}
