//! Test infrastructure for deterministic delivery tests.
//!
//! Provides a scripted in-memory transport, a wiremock-backed webhook
//! receiver, an event recorder, proptest strategies and a harness wiring them
//! to a [`bridge_delivery::RetryingDispatcher`] running on virtual time.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
pub mod harness;
pub mod http;
pub mod strategies;
pub mod transport;

pub use bridge_core::{Clock, TestClock};
pub use events::RecordingEventHandler;
pub use harness::{DispatchHarness, TEST_ENDPOINT};
pub use http::{MockServer, RecordedRequest};
pub use transport::{RecordedCall, ScriptedResponse, ScriptedTransport};
