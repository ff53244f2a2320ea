//! Subscriber fan-out for runtime events.
//!
//! The runtime publishes [`Event`](crate::events::Event)s to a bus; a single
//! listener forwards them to a [`SubscriberSet`], which fans out to
//! user-defined [`Subscribe`] implementations without awaiting them.

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
