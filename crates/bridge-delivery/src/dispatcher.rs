//! Retrying dispatcher: the state machine driving one dispatch.
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │ sleep(backoff(n)), n += 1
//!      ┌────────────┐  retryable, n < max  ─────────────┘
//!  ──▶ │ Attempting │  2xx                ──▶ Success / MalformedSuccessResponse
//!      └────────────┘  4xx, other         ──▶ PermanentFailure
//!                      retryable, n = max ──▶ Exhausted
//!                      token cancelled    ──▶ Cancelled
//! ```
//!
//! Attempts of one dispatch are strictly sequential. Independent dispatches
//! share nothing but the transport's connection pool and may run
//! concurrently.

use std::{num::NonZeroU32, sync::Arc, time::Duration};

use bridge_core::{
    AbandonReason, AttemptFailedEvent, Clock, DeliveredEvent, DispatchAbandonedEvent,
    DispatchEvent, EventHandler, NoOpEventHandler,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    attempt::{Attempt, AttemptExecutor, AttemptOutcome},
    backoff::BackoffPolicy,
    client::{ClientConfig, DeliveryClient, Transport},
    error::{DeliveryError, ErrorCategory, Result},
    request::DeliveryRequest,
};

/// Final result of a dispatch, returned once to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// A 2xx response; `body` is the parsed JSON (`Null` when empty).
    Success {
        /// HTTP status of the successful response
        status_code: u16,
        /// Parsed response body
        body: Value,
        /// Attempts it took
        attempts: u32,
    },

    /// A 2xx response whose body is not JSON. Not retried.
    MalformedSuccessResponse {
        /// HTTP status of the response
        status_code: u16,
        /// Raw response body
        body: String,
        /// Parse failure description
        error: String,
        /// Attempts it took
        attempts: u32,
    },

    /// The endpoint rejected the request; retrying cannot help.
    PermanentFailure {
        /// HTTP status, if the endpoint answered
        status_code: Option<u16>,
        /// Response body, if the endpoint answered
        body: Option<String>,
        /// The failure
        error: DeliveryError,
        /// Attempts made
        attempts: u32,
    },

    /// Every attempt in the budget failed with a retryable error.
    Exhausted {
        /// Failure of the final attempt
        last_error: DeliveryError,
        /// Attempts made, equal to the budget
        attempts: u32,
    },

    /// The caller cancelled the dispatch.
    Cancelled {
        /// Attempts made before cancellation
        attempts: u32,
    },
}

impl DeliveryOutcome {
    /// Whether the request was delivered with a JSON (or empty) body.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::MalformedSuccessResponse { attempts, .. }
            | Self::PermanentFailure { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// HTTP status of the last response, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { status_code, .. } | Self::MalformedSuccessResponse { status_code, .. } => {
                Some(*status_code)
            },
            Self::PermanentFailure { status_code, .. } => *status_code,
            Self::Exhausted { last_error, .. } => last_error.status_code(),
            Self::Cancelled { .. } => None,
        }
    }

    /// Why the dispatch gave up, or `None` on success.
    pub fn abandon_reason(&self) -> Option<AbandonReason> {
        match self {
            Self::Success { .. } => None,
            Self::MalformedSuccessResponse { .. } => Some(AbandonReason::MalformedResponse),
            Self::PermanentFailure { .. } => Some(AbandonReason::PermanentFailure),
            Self::Exhausted { .. } => Some(AbandonReason::Exhausted),
            Self::Cancelled { .. } => Some(AbandonReason::Cancelled),
        }
    }

    /// The failure behind a non-success outcome.
    pub fn error(&self) -> Option<DeliveryError> {
        match self {
            Self::Success { .. } => None,
            Self::MalformedSuccessResponse { status_code, error, .. } => {
                Some(DeliveryError::malformed_response(*status_code, error.clone()))
            },
            Self::PermanentFailure { error, .. } => Some(error.clone()),
            Self::Exhausted { last_error, .. } => Some(last_error.clone()),
            Self::Cancelled { .. } => Some(DeliveryError::Cancelled),
        }
    }
}

/// Outcome of a dispatch together with its full history.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    /// Correlation id of the dispatched request.
    pub request_id: Uuid,
    /// Terminal outcome.
    pub outcome: DeliveryOutcome,
    /// Every attempt, in order.
    pub attempts: Vec<Attempt>,
    /// Backoff delays slept between attempts, in order.
    pub delays: Vec<Duration>,
}

impl DispatchReport {
    /// Sum of all backoff delays slept.
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Delivers requests with bounded exponential-backoff retry.
///
/// Network errors, timeouts and 5xx responses are retried until the attempt
/// budget runs out; a 4xx ends the dispatch at once. Expected failures never
/// surface as `Err`: they are [`DeliveryOutcome`] variants.
#[derive(Debug, Clone)]
pub struct RetryingDispatcher {
    executor: AttemptExecutor,
    policy: BackoffPolicy,
    max_attempts: NonZeroU32,
    clock: Arc<dyn Clock>,
    event_handler: Arc<dyn EventHandler>,
}

impl RetryingDispatcher {
    /// Creates a dispatcher over `transport`.
    ///
    /// The per-attempt timeout defaults to
    /// [`DEFAULT_TIMEOUT_SECONDS`](crate::DEFAULT_TIMEOUT_SECONDS).
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if `policy` fails
    /// [`BackoffPolicy::validate`].
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: BackoffPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        policy.validate()?;
        let max_attempts = NonZeroU32::new(policy.max_attempts)
            .ok_or_else(|| DeliveryError::configuration("max_attempts must be greater than 0"))?;

        let timeout = Duration::from_secs(crate::DEFAULT_TIMEOUT_SECONDS);
        Ok(Self {
            executor: AttemptExecutor::new(transport, clock.clone(), timeout),
            policy,
            max_attempts,
            clock,
            event_handler: Arc::new(NoOpEventHandler),
        })
    }

    /// Creates a dispatcher backed by a reqwest [`DeliveryClient`], using the
    /// client's timeout as the per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the client cannot be
    /// built or the policy is invalid.
    pub fn http(
        client_config: ClientConfig,
        policy: BackoffPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let timeout = client_config.timeout;
        let client = DeliveryClient::new(client_config)?;
        Self::new(Arc::new(client), policy, clock)?.with_attempt_timeout(timeout)
    }

    /// Replaces the per-attempt timeout.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` for a zero timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(DeliveryError::configuration("attempt timeout must be greater than 0"));
        }
        self.executor = AttemptExecutor::new(self.executor.transport(), self.clock.clone(), timeout);
        Ok(self)
    }

    /// Publishes dispatch events to `handler`.
    #[must_use]
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = handler;
        self
    }

    /// The retry policy in force.
    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Dispatches `request` with the policy's attempt budget.
    pub async fn send(&self, request: &DeliveryRequest) -> DeliveryOutcome {
        self.dispatch(request, self.max_attempts, &CancellationToken::new()).await.outcome
    }

    /// Dispatches `request` with a one-off attempt budget.
    pub async fn send_with_max_attempts(
        &self,
        request: &DeliveryRequest,
        max_attempts: NonZeroU32,
    ) -> DeliveryOutcome {
        self.dispatch(request, max_attempts, &CancellationToken::new()).await.outcome
    }

    /// Dispatches `request`, stopping early once `cancel` fires.
    pub async fn send_cancellable(
        &self,
        request: &DeliveryRequest,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        self.dispatch(request, self.max_attempts, cancel).await.outcome
    }

    /// Runs the full dispatch and returns its history.
    ///
    /// The token is checked before every attempt and raced against every
    /// backoff sleep. An attempt already in flight is not interrupted.
    pub async fn dispatch(
        &self,
        request: &DeliveryRequest,
        max_attempts: NonZeroU32,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let max_attempts = max_attempts.get();
        let mut attempts: Vec<Attempt> = Vec::new();
        let mut delays = Vec::new();
        let mut attempt_number = 1;

        let outcome = loop {
            if cancel.is_cancelled() {
                break DeliveryOutcome::Cancelled { attempts: attempt_number - 1 };
            }

            let attempt = self.executor.execute(request, attempt_number).await;

            let outcome = match attempt.outcome {
                AttemptOutcome::Success => {
                    let status_code = attempt.status_code.unwrap_or_default();
                    Some(match attempt.json_body() {
                        Ok(body) => DeliveryOutcome::Success {
                            status_code,
                            body,
                            attempts: attempt_number,
                        },
                        Err(e) => DeliveryOutcome::MalformedSuccessResponse {
                            status_code,
                            body: attempt.body.clone().unwrap_or_default(),
                            error: e.to_string(),
                            attempts: attempt_number,
                        },
                    })
                },
                AttemptOutcome::PermanentFailure => {
                    self.publish_attempt_failed(request, &attempt).await;
                    Some(DeliveryOutcome::PermanentFailure {
                        status_code: attempt.status_code,
                        body: attempt.body.clone(),
                        error: attempt_failure(&attempt),
                        attempts: attempt_number,
                    })
                },
                AttemptOutcome::RetryableFailure => {
                    self.publish_attempt_failed(request, &attempt).await;
                    (attempt_number >= max_attempts).then(|| DeliveryOutcome::Exhausted {
                        last_error: attempt_failure(&attempt),
                        attempts: attempt_number,
                    })
                },
            };
            attempts.push(attempt);

            if let Some(outcome) = outcome {
                break outcome;
            }

            let delay = self.policy.next_delay(attempt_number);
            tracing::debug!(
                request_id = %request.request_id(),
                attempt = attempt_number,
                delay_ms = delay.as_millis(),
                "retrying after backoff"
            );

            let cancelled = tokio::select! {
                biased;
                () = cancel.cancelled() => true,
                () = self.clock.sleep(delay) => false,
            };
            if cancelled {
                break DeliveryOutcome::Cancelled { attempts: attempt_number };
            }

            delays.push(delay);
            attempt_number += 1;
        };

        log_outcome(request, &outcome);
        self.publish_outcome(request, &outcome).await;

        DispatchReport { request_id: request.request_id(), outcome, attempts, delays }
    }

    async fn publish_attempt_failed(&self, request: &DeliveryRequest, attempt: &Attempt) {
        let error = attempt_failure(attempt);
        let event = DispatchEvent::AttemptFailed(AttemptFailedEvent {
            request_id: request.request_id(),
            endpoint_url: request.url().to_string(),
            attempt_number: attempt.attempt_number,
            status_code: attempt.status_code,
            error_message: error.to_string(),
            error_category: ErrorCategory::from(&error).to_string(),
            is_retryable: error.is_retryable(),
            failed_at: self.clock.now_utc(),
        });
        self.event_handler.handle_event(event).await;
    }

    async fn publish_outcome(&self, request: &DeliveryRequest, outcome: &DeliveryOutcome) {
        let event = match (outcome, outcome.abandon_reason(), outcome.error()) {
            (DeliveryOutcome::Success { status_code, attempts, .. }, _, _) => {
                DispatchEvent::Delivered(DeliveredEvent {
                    request_id: request.request_id(),
                    endpoint_url: request.url().to_string(),
                    status_code: *status_code,
                    attempts: *attempts,
                    delivered_at: self.clock.now_utc(),
                })
            },
            (_, Some(reason), Some(error)) => DispatchEvent::Abandoned(DispatchAbandonedEvent {
                request_id: request.request_id(),
                endpoint_url: request.url().to_string(),
                reason,
                attempts: outcome.attempts(),
                status_code: outcome.status_code(),
                error_message: error.to_string(),
                abandoned_at: self.clock.now_utc(),
            }),
            _ => return,
        };
        self.event_handler.handle_event(event).await;
    }
}

/// Failure of a non-successful attempt.
fn attempt_failure(attempt: &Attempt) -> DeliveryError {
    attempt.error.clone().unwrap_or_else(|| {
        DeliveryError::from_status(
            attempt.status_code.unwrap_or_default(),
            attempt.body.clone().unwrap_or_default(),
        )
    })
}

fn log_outcome(request: &DeliveryRequest, outcome: &DeliveryOutcome) {
    let request_id = request.request_id();
    let url = request.url().as_str();
    match outcome {
        DeliveryOutcome::Success { status_code, attempts, .. } => {
            info!(%request_id, url, status_code, attempts, "webhook delivered");
        },
        DeliveryOutcome::MalformedSuccessResponse { status_code, error, attempts, .. } => {
            error!(
                %request_id,
                url,
                status_code,
                attempts,
                error = %error,
                "webhook accepted but response is not JSON"
            );
        },
        DeliveryOutcome::PermanentFailure { status_code, error, attempts, .. } => {
            warn!(
                %request_id,
                url,
                status_code,
                attempts,
                error = %error,
                "webhook rejected, not retrying"
            );
        },
        DeliveryOutcome::Exhausted { last_error, attempts } => {
            error!(
                %request_id,
                url,
                attempts,
                error = %last_error,
                "webhook delivery exhausted retries"
            );
        },
        DeliveryOutcome::Cancelled { attempts } => {
            warn!(%request_id, url, attempts, "webhook delivery cancelled");
        },
    }
}
