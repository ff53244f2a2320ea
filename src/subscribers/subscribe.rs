//! # Subscriber trait for runtime events.
//!
//! Implement [`Subscribe`] to observe [`Event`]s published by the runtime:
//! logging, metrics, alerting, test assertions. Subscribers are registered
//! with a [`SubscriberSet`](super::SubscriberSet), which delivers events
//! through a bounded per-subscriber queue on a dedicated worker.

use async_trait::async_trait;

use crate::events::Event;

/// Observer of runtime events.
///
/// ### Delivery guarantees
/// - Per-subscriber FIFO order.
/// - No global ordering across subscribers; use [`Event::seq`] to reorder.
/// - Events may be dropped for a subscriber whose queue is full.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, ev: &Event);

    /// Stable subscriber name, used in drop/panic diagnostics.
    fn name(&self) -> &'static str;

    /// Capacity of this subscriber's delivery queue.
    fn queue_capacity(&self) -> usize {
        64
    }
}
