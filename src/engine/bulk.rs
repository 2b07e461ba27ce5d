//! Bulk watcher for fan-out commands.
//!
//! A fan-out request spawns one backend sub-task per target, and each
//! sub-task reports its own status stream under the shared request id. No
//! message ends the cycle here; the watcher accumulates everything that
//! matches and counts terminal statuses, and the caller decides when the
//! batch is done and calls [`BulkCommandWatcher::stop`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::ChannelAdapter;
use crate::config::WatchConfig;
use crate::engine::core::{Correlator, TerminationPolicy, Verdict};
use crate::error::Result;
use crate::model::Message;
use crate::status::CommandStatus;

type TimeoutFn = Box<dyn FnMut() + Send + 'static>;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Default)]
struct BulkProgress {
    messages: Vec<Message>,
    finished: usize,
}

/// Accumulates matching messages instead of completing on them.
#[derive(Default)]
struct BulkPolicy {
    progress: Mutex<BulkProgress>,
    on_timeout: Mutex<Option<TimeoutFn>>,
}

impl TerminationPolicy for BulkPolicy {
    fn absorb(&self, message: &Message, status: CommandStatus) -> Verdict {
        if let Ok(mut progress) = self.progress.lock() {
            progress.messages.push(message.clone());
            if status.is_terminal() {
                progress.finished += 1;
            }
        }
        Verdict::Continue
    }

    fn reset(&self) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.messages.clear();
            progress.finished = 0;
        }
    }

    fn notify_complete(&self, _message: Message) {
        // absorb never returns Complete for this policy
    }

    fn notify_timeout(&self) {
        let taken = self.on_timeout.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut on_timeout) = taken {
            on_timeout();
            if let Ok(mut slot) = self.on_timeout.lock() {
                slot.get_or_insert(on_timeout);
            }
        }
    }

    fn notify_progress(&self, _message: &Message, _status: CommandStatus) {}
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Watches every sub-task completion of one fan-out command.
pub struct BulkCommandWatcher<C: ChannelAdapter> {
    core: Correlator<C, BulkPolicy>,
    policy: Arc<BulkPolicy>,
}

impl<C: ChannelAdapter> BulkCommandWatcher<C> {
    pub fn new(channel: C, config: WatchConfig) -> Self {
        let policy = Arc::new(BulkPolicy::default());
        Self {
            core: Correlator::new(channel, config, Arc::clone(&policy)),
            policy,
        }
    }

    /// Register the deadline callback. When the deadline passes, the cycle
    /// ends but the accumulated messages and the terminal count stay
    /// readable until the next `start`. Replaces any previously registered
    /// callback.
    pub fn on_timeout(&self, on_timeout: impl FnMut() + Send + 'static) {
        if let Ok(mut slot) = self.policy.on_timeout.lock() {
            *slot = Some(Box::new(on_timeout));
        }
    }

    /// Start accumulating events for `request_id`, superseding any cycle
    /// already live on this watcher and clearing previous accumulation.
    /// A zero `timeout` arms no deadline.
    pub async fn start(&self, request_id: impl Into<String>, timeout: Duration) -> Result<()> {
        self.core.start(request_id.into(), timeout).await
    }

    /// End the cycle and clear the accumulators. The caller decides when
    /// the batch is complete, typically by watching [`finished_count`].
    ///
    /// [`finished_count`]: BulkCommandWatcher::finished_count
    pub fn stop(&self) {
        self.core.stop();
    }

    /// Every matching message received this cycle, in arrival order.
    pub fn messages(&self) -> Vec<Message> {
        self.policy
            .progress
            .lock()
            .map(|progress| progress.messages.clone())
            .unwrap_or_default()
    }

    /// Terminal statuses seen so far. Duplicate terminal events for the
    /// same sub-task count again; the engine does not dedup by id.
    pub fn finished_count(&self) -> usize {
        self.policy
            .progress
            .lock()
            .map(|progress| progress.finished)
            .unwrap_or(0)
    }

    /// Whether a listen cycle is currently live.
    pub fn is_listening(&self) -> bool {
        self.core.is_listening()
    }
}
