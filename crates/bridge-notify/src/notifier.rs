//! Event notifications over the retrying dispatcher.
//!
//! [`Notifier`] turns each cross-database event into a [`DeliveryRequest`]
//! for its configured endpoint, attaches the shared credentials and hands it
//! to a [`RetryingDispatcher`]. It does no recovery of its own: the caller
//! gets the [`DeliveryOutcome`] and the notifier only logs it.

use std::sync::Arc;

use bridge_core::{MulticastEventHandler, RealClock, TracingEventHandler};
use bridge_delivery::{DeliveryOutcome, DeliveryRequest, RetryingDispatcher};
use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{
    config::BridgeConfig,
    error::NotifyError,
    payload::{
        AuditionSubmission, NewProject, Notification, NotificationKind, OpportunityCreated,
    },
};

/// Header naming the event carried in the body.
pub const EVENT_HEADER: &str = "x-bridge-event";

/// Credentials attached to every notification.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EndpointAuth {
    /// Sent as `x-webhook-secret`.
    pub webhook_secret: Option<String>,
    /// Sent as `Authorization: Bearer`.
    pub service_token: Option<String>,
}

impl std::fmt::Debug for EndpointAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointAuth")
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "***"))
            .field("service_token", &self.service_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Where each kind of event is delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationEndpoints {
    /// Receiver of [`OpportunityCreated`].
    pub opportunity_created: Option<Url>,
    /// Receiver of [`AuditionSubmission`].
    pub audition_submission: Option<Url>,
    /// Receiver of [`NewProject`].
    pub new_project: Option<Url>,
    /// Credentials sent to every receiver.
    pub auth: EndpointAuth,
}

impl NotificationEndpoints {
    /// Endpoint for `kind`, if configured.
    pub fn url(&self, kind: NotificationKind) -> Option<&Url> {
        match kind {
            NotificationKind::OpportunityCreated => self.opportunity_created.as_ref(),
            NotificationKind::AuditionSubmission => self.audition_submission.as_ref(),
            NotificationKind::NewProject => self.new_project.as_ref(),
        }
    }
}

/// Sends cross-database event notifications.
///
/// Cheap to clone; clones share the dispatcher and the shutdown token.
#[derive(Debug, Clone)]
pub struct Notifier {
    dispatcher: RetryingDispatcher,
    endpoints: NotificationEndpoints,
    audition_base_url: String,
    shutdown: CancellationToken,
}

impl Notifier {
    /// Creates a notifier over an existing dispatcher.
    pub fn new(
        dispatcher: RetryingDispatcher,
        endpoints: NotificationEndpoints,
        audition_base_url: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            endpoints,
            audition_base_url: audition_base_url.into(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds a production notifier: reqwest transport, wall clock and
    /// dispatch events logged through `tracing`.
    pub fn from_config(config: &BridgeConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let mut events = MulticastEventHandler::new();
        events.add_subscriber(Arc::new(TracingEventHandler::new()));

        let dispatcher = RetryingDispatcher::http(
            config.to_client_config(),
            config.to_backoff_policy(),
            Arc::new(RealClock::new()),
        )?
        .with_event_handler(Arc::new(events));

        Ok(Self::new(dispatcher, config.endpoints()?, config.audition_base_url.clone()))
    }

    /// Configured endpoints.
    pub fn endpoints(&self) -> &NotificationEndpoints {
        &self.endpoints
    }

    /// Opportunity payload with the audition link derived from the
    /// configured base URL.
    pub fn opportunity(
        &self,
        project_id: impl Into<String>,
        opportunity_id: impl Into<String>,
        created_at: chrono::DateTime<chrono::Utc>,
    ) -> OpportunityCreated {
        OpportunityCreated::new(project_id, opportunity_id, &self.audition_base_url, created_at)
    }

    /// Announces a new opportunity.
    pub async fn notify_opportunity_created(
        &self,
        event: &OpportunityCreated,
    ) -> Result<DeliveryOutcome, NotifyError> {
        self.notify(event).await
    }

    /// Forwards a completed audition, after applying
    /// [`AuditionSubmission::normalized`].
    pub async fn notify_audition_submission(
        &self,
        event: AuditionSubmission,
    ) -> Result<DeliveryOutcome, NotifyError> {
        self.notify(&event.normalized()).await
    }

    /// Announces a new project.
    pub async fn notify_new_project(
        &self,
        event: &NewProject,
    ) -> Result<DeliveryOutcome, NotifyError> {
        self.notify(event).await
    }

    /// Cancels every in-flight and future dispatch of this notifier.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Sends `payload` to the endpoint for its kind.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::EndpointNotConfigured` if no URL is set for the
    /// event, or `NotifyError::Request` if the request cannot be built.
    /// Delivery failures are reported in the returned outcome.
    pub async fn notify<T: Notification>(&self, payload: &T) -> Result<DeliveryOutcome, NotifyError> {
        let kind = T::KIND;
        let url = self.endpoints.url(kind).ok_or(NotifyError::EndpointNotConfigured(kind))?;

        let mut builder =
            DeliveryRequest::post(url.as_str()).json(payload).header(EVENT_HEADER, kind.as_str());
        if let Some(secret) = &self.endpoints.auth.webhook_secret {
            builder = builder.webhook_secret(secret.as_str());
        }
        if let Some(token) = &self.endpoints.auth.service_token {
            builder = builder.bearer_token(token);
        }
        let request = builder.build()?;

        let span = info_span!(
            "notify",
            event = kind.as_str(),
            request_id = %request.request_id()
        );
        let outcome = self
            .dispatcher
            .send_cancellable(&request, &self.shutdown)
            .instrument(span)
            .await;

        log_outcome(kind, &outcome);
        Ok(outcome)
    }
}

fn log_outcome(kind: NotificationKind, outcome: &DeliveryOutcome) {
    let event = kind.as_str();
    let attempts = outcome.attempts();
    match outcome {
        DeliveryOutcome::Success { status_code, .. } => {
            info!(event, status_code, attempts, "notification delivered");
        },
        DeliveryOutcome::PermanentFailure { status_code, error, .. } => {
            warn!(event, status_code, attempts, error = %error, "notification rejected");
        },
        DeliveryOutcome::Cancelled { .. } => {
            warn!(event, attempts, "notification cancelled");
        },
        DeliveryOutcome::Exhausted { last_error, .. } => {
            error!(event, attempts, error = %last_error, "notification undelivered");
        },
        DeliveryOutcome::MalformedSuccessResponse { status_code, error, .. } => {
            error!(
                event,
                status_code,
                attempts,
                error = %error,
                "notification accepted with unreadable response"
            );
        },
    }
}
