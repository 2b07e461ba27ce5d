//! In-memory channel hub.
//!
//! Stands in for the production pub/sub transport: one hub per process, any
//! number of subscribers, fan-out by (tenant, action) topic. Routing is
//! deliberately as coarse as the real transport's: the id in a filter is not
//! honored here, so engine-side id checks stay load-bearing in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{ChannelFilter, Message};

use super::{ChannelAdapter, Subscription};

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// Shared in-process hub. Clones share one subscriber registry.
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    state: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    next_key: u64,
    subscribers: HashMap<u64, Subscriber>,
    refusal: Option<String>,
}

struct Subscriber {
    filter: ChannelFilter,
    tx: mpsc::UnboundedSender<Message>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `message` to every subscriber of the (tenant, action) topic
    /// and return how many received it. Subscribers whose receiver is gone
    /// are evicted.
    pub fn publish(&self, tenant_code: &str, action: &str, message: Message) -> usize {
        let Ok(mut state) = self.state.lock() else {
            return 0;
        };
        let mut delivered = 0;
        state.subscribers.retain(|&key, subscriber| {
            if subscriber.filter.tenant_code != tenant_code || subscriber.filter.action != action {
                return true;
            }
            match subscriber.tx.send(message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    debug!(key, "evicting subscriber with dropped receiver");
                    false
                }
            }
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.subscribers.len())
            .unwrap_or(0)
    }

    /// Sever every open subscription, as a transport outage would. Each
    /// subscriber's stream yields what was already buffered and then ends.
    /// The hub itself stays up and keeps accepting new subscriptions.
    pub fn disconnect_all(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.subscribers.clear();
        }
    }

    /// Make every subsequent `subscribe` fail with `reason`.
    pub fn reject_subscriptions(&self, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.refusal = Some(reason.into());
        }
    }

    /// Undo [`reject_subscriptions`](Self::reject_subscriptions).
    pub fn accept_subscriptions(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.refusal = None;
        }
    }
}

#[async_trait]
impl ChannelAdapter for InMemoryChannel {
    type Subscription = InMemorySubscription;

    async fn subscribe(&self, filter: ChannelFilter) -> Result<InMemorySubscription> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::Subscribe("hub registry lock poisoned".to_string()))?;
        if let Some(reason) = &state.refusal {
            return Err(Error::Subscribe(reason.clone()));
        }
        let key = state.next_key;
        state.next_key += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.insert(key, Subscriber { filter, tx });
        Ok(InMemorySubscription {
            key,
            rx,
            hub: Arc::downgrade(&self.state),
        })
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Receiving half of one hub subscription.
#[derive(Debug)]
pub struct InMemorySubscription {
    key: u64,
    rx: mpsc::UnboundedReceiver<Message>,
    hub: Weak<Mutex<HubState>>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    fn unsubscribe(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        if let Ok(mut state) = hub.lock() {
            state.subscribers.remove(&self.key);
        }
    }
}

impl Drop for InMemorySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
