//! Runtime events and the broadcast bus that carries them.
//!
//! Every externally observable transition in the runtime (sourcing outcomes,
//! timeouts, governance deactivations, completions, escalations) is published
//! as an [`Event`] on the [`Bus`]. Subscribers consume events through the
//! [`subscribers`](crate::subscribers) fan-out.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
