//! Dispatch lifecycle events.
//!
//! The dispatcher publishes a [`DispatchEvent`] for every failed attempt and
//! for every terminal outcome. Subscribers implement [`EventHandler`]; the
//! dispatcher never waits on a subscriber's result and never sees its errors.
//!
//! ```text
//! ┌────────────────────┐  AttemptFailed / Delivered  ┌───────────────────────┐
//! │ RetryingDispatcher │ ──────── / Abandoned ──────▶│ MulticastEventHandler │
//! └────────────────────┘                             └───────────────────────┘
//!                                                        │             │
//!                                                        ▼             ▼
//!                                            TracingEventHandler   test recorders
//! ```

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted while dispatching a single delivery request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DispatchEvent {
    /// One attempt failed; the dispatch may or may not continue.
    AttemptFailed(AttemptFailedEvent),

    /// The request was delivered.
    Delivered(DeliveredEvent),

    /// The dispatch ended without a successful delivery.
    Abandoned(DispatchAbandonedEvent),
}

impl DispatchEvent {
    /// Stable event name used as the `event` field in structured logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AttemptFailed(_) => "webhook.attempt_failed",
            Self::Delivered(_) => "webhook.delivered",
            Self::Abandoned(_) => "webhook.abandoned",
        }
    }

    /// Identifier of the delivery request the event belongs to.
    pub fn request_id(&self) -> Uuid {
        match self {
            Self::AttemptFailed(event) => event.request_id,
            Self::Delivered(event) => event.request_id,
            Self::Abandoned(event) => event.request_id,
        }
    }
}

/// Emitted after each failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailedEvent {
    /// Delivery request identifier.
    pub request_id: Uuid,
    /// Destination URL.
    pub endpoint_url: String,
    /// 1-based attempt number.
    pub attempt_number: u32,
    /// HTTP status, when the endpoint answered.
    pub status_code: Option<u16>,
    /// Human-readable failure description.
    pub error_message: String,
    /// Coarse failure class (`network`, `client`, `server`, ...) for
    /// grouping in logs and dashboards.
    pub error_category: String,
    /// Whether the failure allows another attempt.
    pub is_retryable: bool,
    /// When the attempt finished.
    pub failed_at: DateTime<Utc>,
}

/// Emitted once when a dispatch succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredEvent {
    /// Delivery request identifier.
    pub request_id: Uuid,
    /// Destination URL.
    pub endpoint_url: String,
    /// HTTP status of the successful response.
    pub status_code: u16,
    /// Number of attempts it took.
    pub attempts: u32,
    /// When the successful attempt finished.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted once when a dispatch ends without success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchAbandonedEvent {
    /// Delivery request identifier.
    pub request_id: Uuid,
    /// Destination URL.
    pub endpoint_url: String,
    /// Why the dispatcher gave up.
    pub reason: AbandonReason,
    /// Number of attempts made.
    pub attempts: u32,
    /// HTTP status of the last response, if any.
    pub status_code: Option<u16>,
    /// Description of the last failure.
    pub error_message: String,
    /// When the dispatch ended.
    pub abandoned_at: DateTime<Utc>,
}

/// Terminal failure reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// The endpoint rejected the request (4xx or other non-retryable status).
    PermanentFailure,
    /// The retry budget ran out on retryable failures.
    Exhausted,
    /// The endpoint answered 2xx with a body that is not JSON.
    MalformedResponse,
    /// The caller cancelled the dispatch.
    Cancelled,
}

impl AbandonReason {
    /// Snake-case label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PermanentFailure => "permanent_failure",
            Self::Exhausted => "exhausted",
            Self::MalformedResponse => "malformed_response",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscriber to dispatch events.
///
/// Implementations must not block: the dispatcher awaits `handle_event`
/// inline between attempts.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles one event. Failures are the handler's own business.
    async fn handle_event(&self, event: DispatchEvent);
}

/// Handler that drops every event.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: DispatchEvent) {}
}

/// Handler that turns events into structured `tracing` records.
///
/// Every record carries an `event` field with [`DispatchEvent::name`], so log
/// pipelines can alert on `webhook.abandoned` without parsing messages.
#[derive(Debug, Default)]
pub struct TracingEventHandler;

impl TracingEventHandler {
    /// Creates a new tracing handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for TracingEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        let name = event.name();
        match event {
            DispatchEvent::AttemptFailed(failed) => tracing::warn!(
                event = name,
                request_id = %failed.request_id,
                endpoint_url = %failed.endpoint_url,
                attempt = failed.attempt_number,
                status_code = failed.status_code,
                retryable = failed.is_retryable,
                error_category = %failed.error_category,
                error = %failed.error_message,
                "webhook attempt failed"
            ),
            DispatchEvent::Delivered(delivered) => tracing::info!(
                event = name,
                request_id = %delivered.request_id,
                endpoint_url = %delivered.endpoint_url,
                status_code = delivered.status_code,
                attempts = delivered.attempts,
                "webhook delivered"
            ),
            DispatchEvent::Abandoned(abandoned) => tracing::error!(
                event = name,
                request_id = %abandoned.request_id,
                endpoint_url = %abandoned.endpoint_url,
                reason = %abandoned.reason,
                attempts = abandoned.attempts,
                status_code = abandoned.status_code,
                error = %abandoned.error_message,
                "webhook delivery abandoned"
            ),
        }
    }
}

/// Forwards every event to all registered subscribers concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a multicast handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Registers a subscriber.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: DispatchEvent) {
        let deliveries = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move { handler.handle_event(event).await }
        });

        futures::future::join_all(deliveries).await;
    }
}
