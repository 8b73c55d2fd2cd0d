//! Computation service clients
//!
//! The QTc value is computed by a remote service (`POST /calculate_qtc`).
//! [`HttpQtcService`] speaks that RPC with timeouts, explicit status mapping and
//! bounded retries. [`LocalQtcService`] evaluates the same formulas in-process.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QtcConfig;
use crate::error::QtcError;
use crate::formula;
use crate::types::{NormalizedMeasurement, QtcRequest, QtcResult};

/// RPC contract version sent with every request
pub const API_VERSION: &str = "1";

/// Upper bound for a single backoff sleep
const MAX_BACKOFF_MS: u64 = 5_000;

/// Upper bound for error messages carrying a response body
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Something that can turn a QTc request into a result
pub trait QtcService {
    fn calculate(&self, request: &QtcRequest) -> Result<QtcResult, QtcError>;
}

/// In-process service evaluating the closed-form formulas
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalQtcService;

impl QtcService for LocalQtcService {
    fn calculate(&self, request: &QtcRequest) -> Result<QtcResult, QtcError> {
        let measurement = NormalizedMeasurement {
            qt_ms: request.qt,
            heart_rate: request.fc,
            rr_seconds: request.rr,
            formula: request.method,
        };
        let qtc = formula::evaluate(&measurement);
        if !qtc.is_finite() {
            return Err(QtcError::ComputationUnavailable(format!(
                "{} produced a non-finite QTc",
                request.method
            )));
        }
        Ok(QtcResult { qtc })
    }
}

/// HTTP client for the remote computation service
pub struct HttpQtcService {
    url: String,
    agent: ureq::Agent,
    max_attempts: u32,
    retry_backoff_ms: u64,
}

/// Outcome of one failed attempt
struct AttemptError {
    message: String,
    retryable: bool,
}

impl AttemptError {
    fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl HttpQtcService {
    pub fn new(config: &QtcConfig) -> Self {
        // `timeout` bounds the whole exchange; the read timeout alone resets on
        // every received chunk
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.request_timeout_ms))
            .timeout_write(Duration::from_millis(config.request_timeout_ms))
            .build();

        Self {
            url: config.calculate_url(),
            agent,
            max_attempts: config.max_attempts.max(1),
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn attempt(&self, payload: &str, request_id: &str) -> Result<QtcResult, AttemptError> {
        let response = self
            .agent
            .post(&self.url)
            .set("content-type", "application/json")
            .set("accept", "application/json")
            .set("x-qtc-api-version", API_VERSION)
            .set("x-request-id", request_id)
            .send_string(payload);

        match response {
            Ok(resp) => {
                let status = resp.status();
                if !(200..=299).contains(&status) {
                    return Err(status_error(status));
                }
                if let Some(content_type) = resp.header("content-type") {
                    if !content_type.to_ascii_lowercase().contains("json") {
                        return Err(AttemptError::fatal(format!(
                            "unexpected response content type `{}`",
                            content_type
                        )));
                    }
                }
                let body = resp
                    .into_string()
                    .map_err(|e| AttemptError::retryable(format!("response read failed: {}", e)))?;
                parse_response(&body).map_err(AttemptError::fatal)
            }
            Err(ureq::Error::Status(code, resp)) => {
                let mut err = status_error(code);
                if let Ok(body) = resp.into_string() {
                    if !body.is_empty() {
                        let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
                        err.message = format!("{}: {}", err.message, body);
                    }
                }
                Err(err)
            }
            Err(ureq::Error::Transport(transport)) => Err(AttemptError::retryable(format!(
                "transport error: {}",
                transport
            ))),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor).min(MAX_BACKOFF_MS))
    }
}

impl QtcService for HttpQtcService {
    fn calculate(&self, request: &QtcRequest) -> Result<QtcResult, QtcError> {
        let payload = serde_json::to_string(request)?;
        let request_id = Uuid::new_v4().to_string();

        let mut attempt = 1;
        loop {
            debug!(url = %self.url, %request_id, attempt, "sending QTc request");
            match self.attempt(&payload, &request_id) {
                Ok(result) => return Ok(result),
                Err(err) if err.retryable && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        %request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err.message,
                        "QTc request failed, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    return Err(QtcError::ComputationUnavailable(format!(
                        "{} (after {} attempt{})",
                        err.message,
                        attempt,
                        if attempt == 1 { "" } else { "s" }
                    )))
                }
            }
        }
    }
}

/// 408, 429 and 5xx are worth retrying; any other non-2xx is final
fn status_error(status: u16) -> AttemptError {
    let message = format!("service responded with http status {}", status);
    if status == 408 || status == 429 || (500..=599).contains(&status) {
        AttemptError::retryable(message)
    } else {
        AttemptError::fatal(message)
    }
}

fn parse_response(body: &str) -> Result<QtcResult, String> {
    let result: QtcResult =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;
    if !result.qtc.is_finite() {
        return Err("malformed response: qtc is not finite".to_string());
    }
    Ok(result)
}
