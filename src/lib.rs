//! Reliable webhook delivery between the audition platform and the Vetted
//! service.
//!
//! Re-exports the workspace crates under one roof:
//!
//! - [`delivery`]: backoff policy, single attempts and the retrying
//!   dispatcher
//! - [`notify`]: payloads and the notifier for the three cross-database
//!   events, plus [`BridgeConfig`]
//! - [`events`] and [`time`]: dispatch events and the injectable clock
//! - [`telemetry`]: tracing setup
//!
//! ```no_run
//! use vetted_bridge::{telemetry, BridgeConfig, Notifier};
//!
//! # async fn example() -> anyhow::Result<()> {
//! telemetry::init_tracing(telemetry::DEFAULT_FILTER, telemetry::LogFormat::Json)?;
//!
//! let config = BridgeConfig::load()?;
//! tracing::info!(config = ?config.redacted(), "bridge configured");
//! let notifier = Notifier::from_config(&config)?;
//! # let _ = notifier;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod telemetry;

pub use bridge_core::{events, time};
pub use bridge_delivery as delivery;
pub use bridge_delivery::{
    BackoffPolicy, DeliveryError, DeliveryOutcome, DeliveryRequest, DispatchReport,
    RetryingDispatcher,
};
pub use bridge_notify as notify;
pub use bridge_notify::{
    AuditionSubmission, BridgeConfig, NewProject, Notifier, NotifyError, OpportunityCreated,
};
