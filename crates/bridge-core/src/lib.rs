//! Shared primitives for the Vetted bridge.
//!
//! Provides the clock abstraction used for backoff sleeps and the dispatch
//! event system used to observe delivery outcomes. Every other bridge crate
//! depends on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod time;

pub use events::{
    AbandonReason, AttemptFailedEvent, DeliveredEvent, DispatchAbandonedEvent, DispatchEvent,
    EventHandler, MulticastEventHandler, NoOpEventHandler, TracingEventHandler,
};
pub use time::{Clock, RealClock, TestClock};
