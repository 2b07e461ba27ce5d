//! Push-channel seam.
//!
//! The engine consumes the shared channel through these traits and never
//! sees the transport. Production wires its pub/sub client in from outside;
//! tests and local setups use the in-memory hub in [`memory`].

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{ChannelFilter, Message};

/// Client of the shared push channel.
#[async_trait]
pub trait ChannelAdapter: Send + Sync + 'static {
    type Subscription: Subscription + 'static;

    /// Open a subscription scoped by `filter`.
    ///
    /// The transport routes on tenant and action; it may still deliver
    /// messages for other ids, which subscribers must tolerate. A failure
    /// here is the caller's to handle; the engine never retries.
    async fn subscribe(&self, filter: ChannelFilter) -> Result<Self::Subscription>;
}

/// One open subscription.
#[async_trait]
pub trait Subscription: Send {
    /// Next message, in delivery order. `None` once the transport has closed
    /// the stream.
    async fn recv(&mut self) -> Option<Message>;

    /// Stop delivery. Idempotent, and safe to call after the transport has
    /// already closed.
    fn unsubscribe(&mut self);
}
