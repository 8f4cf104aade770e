//! Cross-database event notifications for the Vetted bridge.
//!
//! Three events leave the audition platform for the Vetted service: an
//! opportunity was created, a candidate submitted an audition and a recruiter
//! created a project. Each is a small JSON payload POSTed to its own webhook
//! with at-least-once, bounded-retry delivery.
//!
//! ```no_run
//! use bridge_notify::{BridgeConfig, NewProject, Notifier};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let notifier = Notifier::from_config(&BridgeConfig::load()?)?;
//!
//! let outcome = notifier
//!     .notify_new_project(&NewProject {
//!         project_id: "proj-1".into(),
//!         project_title: "Data Labeling".into(),
//!         recruiter_email: "rita@example.com".into(),
//!         recruiter_name: "Rita".into(),
//!     })
//!     .await?;
//! println!("delivered: {}", outcome.is_success());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod notifier;
pub mod payload;

pub use config::BridgeConfig;
pub use error::NotifyError;
pub use notifier::{EndpointAuth, NotificationEndpoints, Notifier, EVENT_HEADER};
pub use payload::{
    audition_url, AuditionAnswer, AuditionSubmission, CandidateProfile, NewProject,
    Notification, NotificationKind, OpportunityCreated,
};
