//! Error types for event notifications.

use bridge_delivery::DeliveryError;
use thiserror::Error;

use crate::payload::NotificationKind;

/// Why a notification could not be dispatched at all.
///
/// Delivery failures after dispatch started are not errors: they come back as
/// a [`bridge_delivery::DeliveryOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// No webhook URL is configured for this kind of event.
    #[error("no webhook endpoint configured for {0}")]
    EndpointNotConfigured(NotificationKind),

    /// The delivery request could not be built.
    #[error("invalid notification request: {0}")]
    Request(#[from] DeliveryError),
}
