//! Ready-made dispatcher wiring for deterministic tests.
//!
//! A [`DispatchHarness`] pairs a [`RetryingDispatcher`] with a
//! [`ScriptedTransport`], a [`TestClock`] and a [`RecordingEventHandler`], so
//! a test can script the endpoint, run a dispatch in virtual time and inspect
//! every side effect afterwards.

use std::sync::Arc;

use bridge_core::TestClock;
use bridge_delivery::{BackoffPolicy, DeliveryRequest, RetryingDispatcher};
use serde::Serialize;

use crate::{events::RecordingEventHandler, transport::ScriptedResponse, ScriptedTransport};

/// URL the harness requests are addressed to.
pub const TEST_ENDPOINT: &str = "https://receiver.vetted.test/webhooks/test";

/// Scripted dispatcher plus its collaborators.
#[derive(Debug, Clone)]
pub struct DispatchHarness {
    /// The dispatcher under test.
    pub dispatcher: RetryingDispatcher,
    /// Scripted endpoint; records every call.
    pub transport: ScriptedTransport,
    /// Virtual clock; records every backoff sleep.
    pub clock: TestClock,
    /// Every event the dispatcher published.
    pub events: RecordingEventHandler,
}

impl DispatchHarness {
    /// Harness using the default policy (5 attempts, 1s doubling to 60s).
    pub fn new(script: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self::with_policy(script, BackoffPolicy::default())
    }

    /// Harness using `policy`.
    ///
    /// # Panics
    ///
    /// Panics if `policy` is invalid.
    pub fn with_policy(
        script: impl IntoIterator<Item = ScriptedResponse>,
        policy: BackoffPolicy,
    ) -> Self {
        Self::with_transport(ScriptedTransport::new(script), policy)
    }

    /// Harness over an already configured transport.
    ///
    /// # Panics
    ///
    /// Panics if `policy` is invalid.
    pub fn with_transport(transport: ScriptedTransport, policy: BackoffPolicy) -> Self {
        let clock = TestClock::new();
        let events = RecordingEventHandler::new();
        let dispatcher =
            RetryingDispatcher::new(Arc::new(transport.clone()), policy, Arc::new(clock.clone()))
                .unwrap_or_else(|e| panic!("invalid test policy: {e}"))
                .with_event_handler(Arc::new(events.clone()));

        Self { dispatcher, transport, clock, events }
    }

    /// JSON POST of `payload` to [`TEST_ENDPOINT`].
    ///
    /// # Panics
    ///
    /// Panics if `payload` cannot be serialized.
    pub fn request<T: Serialize + ?Sized>(&self, payload: &T) -> DeliveryRequest {
        DeliveryRequest::post(TEST_ENDPOINT)
            .json(payload)
            .build()
            .unwrap_or_else(|e| panic!("invalid test request: {e}"))
    }
}
