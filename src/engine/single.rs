//! Single-completion watcher.
//!
//! Wraps the correlation core with a policy that ends the cycle on the
//! first terminal status. The done callback fires exactly once per cycle,
//! with the terminal message on completion or `None` on timeout, and the
//! watcher returns to idle either way.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::channel::ChannelAdapter;
use crate::config::WatchConfig;
use crate::engine::core::{Correlator, TerminationPolicy, Verdict};
use crate::error::Result;
use crate::model::Message;
use crate::status::CommandStatus;

type DoneFn = Box<dyn FnMut(Option<Message>) + Send + 'static>;
type ProgressFn = Box<dyn FnMut(&Message, CommandStatus) + Send + 'static>;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Latest-wins callback slots. Each slot holds the most recently registered
/// callback; registering again replaces it for all future cycles.
#[derive(Default)]
struct SinglePolicy {
    done: Mutex<Option<DoneFn>>,
    progress: Mutex<Option<ProgressFn>>,
}

impl SinglePolicy {
    /// Take the done callback out of its slot, call it, and put it back if
    /// the slot is still empty. The callback itself may register a
    /// replacement; that replacement wins over the one being restored.
    fn invoke_done(&self, outcome: Option<Message>) {
        let taken = self.done.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut done) = taken {
            done(outcome);
            if let Ok(mut slot) = self.done.lock() {
                slot.get_or_insert(done);
            }
        }
    }

    fn invoke_progress(&self, message: &Message, status: CommandStatus) {
        let taken = self.progress.lock().ok().and_then(|mut slot| slot.take());
        if let Some(mut progress) = taken {
            progress(message, status);
            if let Ok(mut slot) = self.progress.lock() {
                slot.get_or_insert(progress);
            }
        }
    }
}

impl TerminationPolicy for SinglePolicy {
    fn absorb(&self, _message: &Message, status: CommandStatus) -> Verdict {
        if status.is_terminal() {
            Verdict::Complete
        } else {
            Verdict::Continue
        }
    }

    fn reset(&self) {}

    fn notify_complete(&self, message: Message) {
        self.invoke_done(Some(message));
    }

    fn notify_timeout(&self) {
        self.invoke_done(None);
    }

    fn notify_progress(&self, message: &Message, status: CommandStatus) {
        self.invoke_progress(message, status);
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

/// Watches one command at a time and reports its completion.
pub struct CommandWatcher<C: ChannelAdapter> {
    core: Correlator<C, SinglePolicy>,
    policy: Arc<SinglePolicy>,
}

impl<C: ChannelAdapter> CommandWatcher<C> {
    pub fn new(channel: C, config: WatchConfig) -> Self {
        let policy = Arc::new(SinglePolicy::default());
        Self {
            core: Correlator::new(channel, config, Arc::clone(&policy)),
            policy,
        }
    }

    /// Register the completion callback. Called with the terminal message,
    /// or `None` when the deadline passes first. Replaces any previously
    /// registered callback.
    pub fn on_done(&self, done: impl FnMut(Option<Message>) + Send + 'static) {
        if let Ok(mut slot) = self.policy.done.lock() {
            *slot = Some(Box::new(done));
        }
    }

    /// Register an observer for intermediate statuses of the live request.
    /// The engine takes no action on these; the cycle keeps listening.
    pub fn on_progress(&self, progress: impl FnMut(&Message, CommandStatus) + Send + 'static) {
        if let Ok(mut slot) = self.policy.progress.lock() {
            *slot = Some(Box::new(progress));
        }
    }

    /// Listen for the completion of `request_id`, superseding any cycle
    /// already live on this watcher. A zero `timeout` waits indefinitely.
    ///
    /// Returns an error when the subscription cannot be established; the
    /// watcher stays idle in that case.
    pub async fn start(&self, request_id: impl Into<String>, timeout: Duration) -> Result<()> {
        self.core.start(request_id.into(), timeout).await
    }

    /// Whether a listen cycle is currently live.
    pub fn is_listening(&self) -> bool {
        self.core.is_listening()
    }
}
