//! A single delivery attempt and its classification.

use std::{sync::Arc, time::Duration};

use bridge_core::Clock;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::Instrument;

use crate::{
    client::{duration_millis, DeliveryResponse, Transport},
    error::DeliveryError,
    request::DeliveryRequest,
};

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    /// 2xx response.
    Success,
    /// Network failure, timeout or 5xx: another attempt may succeed.
    RetryableFailure,
    /// 4xx or another status a retry cannot fix.
    PermanentFailure,
}

impl AttemptOutcome {
    /// Classifies an HTTP status.
    ///
    /// Anything at or above 500 counts as a server failure, including
    /// non-standard codes past 599.
    pub fn from_status(status_code: u16) -> Self {
        match status_code {
            200..=299 => Self::Success,
            500.. => Self::RetryableFailure,
            _ => Self::PermanentFailure,
        }
    }
}

/// Record of one attempt. Created once, never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    /// 1-based attempt number within the dispatch.
    pub attempt_number: u32,
    /// Classification of the result.
    pub outcome: AttemptOutcome,
    /// HTTP status, when a response arrived.
    pub status_code: Option<u16>,
    /// Response body text, when a response arrived.
    pub body: Option<String>,
    /// Failure detail for anything but success.
    pub error: Option<DeliveryError>,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// How long the attempt took.
    pub duration: Duration,
}

impl Attempt {
    fn from_response(
        attempt_number: u32,
        response: DeliveryResponse,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let outcome = AttemptOutcome::from_status(response.status_code);
        let error = match outcome {
            AttemptOutcome::Success => None,
            _ => Some(DeliveryError::from_status(response.status_code, response.body.clone())),
        };

        Self {
            attempt_number,
            outcome,
            status_code: Some(response.status_code),
            body: Some(response.body),
            error,
            started_at,
            duration,
        }
    }

    fn from_error(
        attempt_number: u32,
        error: DeliveryError,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let outcome = if error.is_retryable() {
            AttemptOutcome::RetryableFailure
        } else {
            AttemptOutcome::PermanentFailure
        };

        Self {
            attempt_number,
            outcome,
            status_code: None,
            body: None,
            error: Some(error),
            started_at,
            duration,
        }
    }

    /// Parses the body of a successful attempt as JSON.
    ///
    /// An empty or whitespace-only body is `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::MalformedResponse` when a non-empty body is not
    /// valid JSON.
    pub fn json_body(&self) -> Result<Value, DeliveryError> {
        let status_code = self.status_code.unwrap_or_default();
        match self.body.as_deref().map(str::trim) {
            None | Some("") => Ok(Value::Null),
            Some(text) => serde_json::from_str(text)
                .map_err(|e| DeliveryError::malformed_response(status_code, e.to_string())),
        }
    }
}

/// Executes single attempts against a [`Transport`].
///
/// Exactly one transport call per [`execute`](Self::execute); the per-attempt
/// timeout applies on top of whatever the transport enforces itself.
#[derive(Debug, Clone)]
pub struct AttemptExecutor {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl AttemptExecutor {
    /// Creates an executor with the given per-attempt timeout.
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        Self { transport, clock, timeout }
    }

    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Transport the attempts go through.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Sends `request` once and classifies the result.
    pub async fn execute(&self, request: &DeliveryRequest, attempt_number: u32) -> Attempt {
        let span = tracing::info_span!(
            "webhook_delivery",
            request_id = %request.request_id(),
            url = %request.url(),
            attempt = attempt_number
        );

        async move {
            let started_at = self.clock.now_utc();
            let start = self.clock.now();

            let result =
                tokio::time::timeout(self.timeout, self.transport.send(request, attempt_number))
                    .await
                    .unwrap_or_else(|_| Err(DeliveryError::timeout(duration_millis(self.timeout))));
            let duration = self.clock.now().saturating_duration_since(start);

            let attempt = match result {
                Ok(response) => Attempt::from_response(attempt_number, response, started_at, duration),
                Err(error) => Attempt::from_error(attempt_number, error, started_at, duration),
            };

            tracing::debug!(
                outcome = ?attempt.outcome,
                status = attempt.status_code,
                duration_ms = duration.as_millis(),
                "attempt finished"
            );

            attempt
        }
        .instrument(span)
        .await
    }
}
