//! Computation session
//!
//! Holds the application state explicitly and drives each computation through
//! `Idle → Requesting → Succeeded | Failed`. Only a successful computation
//! touches the result, the curve or the history.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::QtcService;
use crate::engine::QtcEngine;
use crate::error::QtcError;
use crate::history::{HistoryStore, KvStore};
use crate::normalizer::Normalizer;
use crate::types::{DensityPoint, HistoryEntry, HistoryLog, Measurement, QtcResult};

/// Where the session is in its computation cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Requesting,
    Succeeded,
    Failed(String),
}

/// Everything the display surface needs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppState {
    pub phase: Phase,
    /// Last successful result; kept across failures
    pub last_result: Option<QtcResult>,
    /// Reference curve of the last successful computation
    pub curve: Vec<DensityPoint>,
    pub history: HistoryLog,
}

impl AppState {
    pub fn new(history: HistoryLog) -> Self {
        Self {
            phase: Phase::Idle,
            last_result: None,
            curve: Vec::new(),
            history,
        }
    }

    /// Whether a computation is in flight
    pub fn is_busy(&self) -> bool {
        self.phase == Phase::Requesting
    }

    /// Move into `Requesting`
    pub fn begin_request(self) -> Self {
        AppState {
            phase: Phase::Requesting,
            ..self
        }
    }

    /// Record a successful computation
    pub fn succeed(self, result: QtcResult, curve: Vec<DensityPoint>, history: HistoryLog) -> Self {
        AppState {
            phase: Phase::Succeeded,
            last_result: Some(result),
            curve,
            history,
        }
    }

    /// Record a failure; result, curve and history stay as they were
    pub fn fail(self, error: &QtcError) -> Self {
        AppState {
            phase: Phase::Failed(error.to_string()),
            ..self
        }
    }
}

/// Stateful processor tying the engine to the history store
pub struct QtcSession<C: QtcService, S: KvStore> {
    engine: QtcEngine<C>,
    store: HistoryStore<S>,
    state: AppState,
}

impl<C: QtcService, S: KvStore> QtcSession<C, S> {
    /// Start a session, loading persisted history
    pub fn open(engine: QtcEngine<C>, store: HistoryStore<S>) -> Self {
        let history = store.load();
        Self {
            engine,
            store,
            state: AppState::new(history),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn history(&self) -> &HistoryLog {
        &self.state.history
    }

    pub fn engine(&self) -> &QtcEngine<C> {
        &self.engine
    }

    /// Run one computation for `measurement`
    ///
    /// Taking `&mut self` keeps computations on a session strictly sequential.
    pub fn calculate(&mut self, measurement: &Measurement) -> Result<QtcResult, QtcError> {
        let state = std::mem::replace(&mut self.state, AppState::new(HistoryLog::new()));
        let (state, outcome) = run(&self.engine, &self.store, state, measurement);
        self.state = state;
        outcome
    }

    /// Run one computation from form fields, with unit and formula given by name
    ///
    /// An unknown unit or formula fails the session like any other input error:
    /// no request is made and the history is left as it was.
    pub fn calculate_form(
        &mut self,
        qt_raw: f64,
        qt_unit: &str,
        heart_rate: f64,
        rr_interval: f64,
        formula: &str,
    ) -> Result<QtcResult, QtcError> {
        match Measurement::from_form(qt_raw, qt_unit, heart_rate, rr_interval, formula) {
            Ok(measurement) => self.calculate(&measurement),
            Err(e) => {
                warn!(error = %e, "form rejected");
                let state = std::mem::replace(&mut self.state, AppState::new(HistoryLog::new()));
                self.state = state.fail(&e);
                Err(e)
            }
        }
    }
}

/// Drive `state` through one computation and return the next state
pub fn run<C: QtcService, S: KvStore>(
    engine: &QtcEngine<C>,
    store: &HistoryStore<S>,
    state: AppState,
    measurement: &Measurement,
) -> (AppState, Result<QtcResult, QtcError>) {
    if state.is_busy() {
        return (state, Err(QtcError::Busy));
    }

    let normalized = match Normalizer::normalize_measurement(measurement) {
        Ok(normalized) => normalized,
        Err(e) => return (state.fail(&e), Err(e)),
    };

    let state = state.begin_request();

    match engine.compute_qtc(&normalized) {
        Ok(result) => {
            let mut state = state;
            let history = std::mem::take(&mut state.history);
            let history = store.append(history, HistoryEntry::new(&normalized, result));
            info!(entries = history.len(), qtc = result.qtc, "computation recorded");
            let curve = engine.generate_curve();
            (state.succeed(result, curve, history), Ok(result))
        }
        Err(e) => {
            warn!(error = %e, "computation failed, history left unchanged");
            (state.fail(&e), Err(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MemoryKvStore;
    use crate::types::{Formula, QtUnit, QtcRequest};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Replays scripted answers in order
    struct ScriptedService {
        answers: RefCell<Vec<Result<f64, String>>>,
    }

    impl ScriptedService {
        fn new(answers: Vec<Result<f64, String>>) -> Self {
            Self {
                answers: RefCell::new(answers.into_iter().rev().collect()),
            }
        }
    }

    impl QtcService for ScriptedService {
        fn calculate(&self, _request: &QtcRequest) -> Result<QtcResult, QtcError> {
            match self.answers.borrow_mut().pop() {
                Some(Ok(qtc)) => Ok(QtcResult { qtc }),
                Some(Err(msg)) => Err(QtcError::ComputationUnavailable(msg)),
                None => Err(QtcError::ComputationUnavailable("no answer".to_string())),
            }
        }
    }

    fn measurement(formula: Formula) -> Measurement {
        Measurement {
            qt_raw: 360.0,
            qt_unit: QtUnit::Milliseconds,
            heart_rate: 75.0,
            rr_interval: 0.8,
            formula,
        }
    }

    fn session(
        answers: Vec<Result<f64, String>>,
    ) -> QtcSession<ScriptedService, MemoryKvStore> {
        QtcSession::open(
            QtcEngine::new(ScriptedService::new(answers)),
            HistoryStore::new(MemoryKvStore::new(), "qtcHistory"),
        )
    }

    #[test]
    fn test_success_updates_everything() {
        let mut session = session(vec![Ok(402.49)]);
        assert_eq!(session.state().phase, Phase::Idle);

        let result = session.calculate(&measurement(Formula::Bazett)).unwrap();

        let state = session.state();
        assert_eq!(result.qtc, 402.49);
        assert_eq!(state.phase, Phase::Succeeded);
        assert_eq!(state.last_result, Some(result));
        assert_eq!(state.curve.len(), 100);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history.entries()[0].method, Formula::Bazett);
    }

    #[test]
    fn test_failure_keeps_stale_result_and_history() {
        let mut session = session(vec![Ok(402.49), Err("timeout".to_string())]);
        session.calculate(&measurement(Formula::Bazett)).unwrap();
        let before = session.state().clone();

        let err = session.calculate(&measurement(Formula::Hodges)).unwrap_err();
        assert!(matches!(err, QtcError::ComputationUnavailable(_)));

        let state = session.state();
        assert!(matches!(state.phase, Phase::Failed(ref msg) if msg.contains("timeout")));
        assert_eq!(state.last_result, before.last_result);
        assert_eq!(state.curve, before.curve);
        assert_eq!(state.history, before.history);
    }

    #[test]
    fn test_invalid_input_blocks_request() {
        let mut session = session(vec![Ok(999.0)]);
        let mut bad = measurement(Formula::Bazett);
        bad.rr_interval = 0.0;

        let err = session.calculate(&bad).unwrap_err();
        assert!(err.is_input_error());
        assert!(session.history().is_empty());

        // The scripted answer was not consumed
        let result = session.calculate(&measurement(Formula::Bazett)).unwrap();
        assert_eq!(result.qtc, 999.0);
    }

    #[test]
    fn test_form_with_unknown_formula_fails_without_request() {
        let mut session = session(vec![Ok(402.49), Ok(999.0)]);
        session
            .calculate_form(9.0, "Petits carreaux", 75.0, 0.8, "Bazett")
            .unwrap();
        let before = session.state().clone();

        let err = session
            .calculate_form(360.0, "ms", 75.0, 0.8, "Sagie")
            .unwrap_err();
        assert!(matches!(err, QtcError::UnknownFormula(ref name) if name == "Sagie"));

        let state = session.state();
        assert!(matches!(state.phase, Phase::Failed(ref msg) if msg.contains("Sagie")));
        assert_eq!(state.last_result, before.last_result);
        assert_eq!(state.history, before.history);

        // The second scripted answer was not consumed
        let result = session.calculate(&measurement(Formula::Hodges)).unwrap();
        assert_eq!(result.qtc, 999.0);
    }

    #[test]
    fn test_requesting_state_is_busy() {
        let engine = QtcEngine::new(ScriptedService::new(vec![Ok(400.0)]));
        let store = HistoryStore::new(MemoryKvStore::new(), "qtcHistory");
        let in_flight = AppState::new(HistoryLog::new()).begin_request();
        assert!(in_flight.is_busy());

        let (state, outcome) = run(&engine, &store, in_flight, &measurement(Formula::Bazett));
        assert!(matches!(outcome, Err(QtcError::Busy)));
        assert_eq!(state.phase, Phase::Requesting);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_history_survives_reopen() {
        let store = HistoryStore::new(MemoryKvStore::new(), "qtcHistory");
        let engine = QtcEngine::new(ScriptedService::new(vec![Ok(400.0), Ok(410.0)]));

        let state = AppState::new(store.load());
        let (state, _) = run(&engine, &store, state, &measurement(Formula::Bazett));
        let (state, _) = run(&engine, &store, state, &measurement(Formula::Fridericia));

        assert_eq!(store.load(), state.history);
        let qtcs: Vec<f64> = store.load().iter().map(|e| e.qtc).collect();
        assert_eq!(qtcs, vec![400.0, 410.0]);
    }

    #[test]
    fn test_phase_serializes_for_display() {
        let json = serde_json::to_value(Phase::Failed("boom".to_string())).unwrap();
        assert_eq!(json, serde_json::json!({ "state": "failed", "error": "boom" }));
    }
}
