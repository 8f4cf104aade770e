//! Reliable webhook delivery with bounded exponential-backoff retry.
//!
//! A [`RetryingDispatcher`] takes an immutable [`DeliveryRequest`], sends it
//! through a [`Transport`] and keeps trying on network errors, timeouts and
//! 5xx responses until it succeeds, hits a permanent failure (4xx), runs out
//! of attempts or is cancelled.
//!
//! 1. **Attempt** - [`AttemptExecutor`] issues one POST and classifies it
//! 2. **Decide** - success and permanent failure end the dispatch
//! 3. **Back off** - [`BackoffPolicy`] picks the delay, the [`Clock`] sleeps
//! 4. **Report** - the caller gets a single [`DeliveryOutcome`]
//!
//! Delivery is at-least-once and in-memory only: nothing is queued or
//! persisted beyond the call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bridge_core::RealClock;
//! use bridge_delivery::{
//!     BackoffPolicy, ClientConfig, DeliveryError, DeliveryRequest, RetryingDispatcher,
//! };
//!
//! # async fn example() -> Result<(), DeliveryError> {
//! let dispatcher = RetryingDispatcher::http(
//!     ClientConfig::default(),
//!     BackoffPolicy::default(),
//!     Arc::new(RealClock),
//! )?;
//!
//! let request = DeliveryRequest::post("https://vetted.example.com/hooks/project")
//!     .json(&serde_json::json!({ "project_id": "proj-1" }))
//!     .webhook_secret("from-the-environment")
//!     .build()?;
//!
//! let outcome = dispatcher.send(&request).await;
//! println!("delivered: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! [`Clock`]: bridge_core::Clock

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attempt;
pub mod backoff;
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod request;

pub use attempt::{Attempt, AttemptExecutor, AttemptOutcome};
pub use backoff::{BackoffPolicy, BackoffStrategy};
pub use client::{
    ClientConfig, DeliveryClient, DeliveryResponse, Transport, ATTEMPT_HEADER, REQUEST_ID_HEADER,
};
pub use dispatcher::{DeliveryOutcome, DispatchReport, RetryingDispatcher};
pub use error::{DeliveryError, ErrorCategory, Result};
pub use request::{DeliveryRequest, DeliveryRequestBuilder, WEBHOOK_SECRET_HEADER};

/// Default per-attempt timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
