//! Generic correlation core shared by the single and bulk watchers.
//!
//! One `Correlator` owns at most one live listen cycle. Every state
//! transition (start, stop, message, timer fire) funnels through the state
//! lock, and each cycle carries the generation it was started under; a
//! callback arriving with a stale generation finds the state already moved
//! on and backs out without side effects. User callbacks always run outside
//! the lock, so they may reentrantly call back into the watcher.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{Instrument, debug, info, trace, warn};
use uuid::Uuid;

use crate::channel::{ChannelAdapter, Subscription};
use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::model::{ChannelFilter, Message};
use crate::status::CommandStatus;
use crate::telemetry;
use crate::timer::{self, TimerHandle};

// ---------------------------------------------------------------------------
// Termination policy
// ---------------------------------------------------------------------------

/// What a matching message means for the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Keep listening.
    Continue,
    /// The cycle is complete; tear down and emit the completion.
    Complete,
}

/// Variant-specific half of the engine.
///
/// `absorb` and `reset` run under the state lock and must not invoke user
/// code; the `notify_*` methods run outside it and may.
pub(crate) trait TerminationPolicy: Send + Sync + 'static {
    /// Record one matching message and decide whether the cycle ends.
    fn absorb(&self, message: &Message, status: CommandStatus) -> Verdict;

    /// Clear per-cycle accumulators.
    fn reset(&self);

    /// The cycle completed on a terminal message.
    fn notify_complete(&self, message: Message);

    /// The deadline passed with the cycle still live.
    fn notify_timeout(&self);

    /// An intermediate message matched the live request.
    fn notify_progress(&self, message: &Message, status: CommandStatus);
}

// ---------------------------------------------------------------------------
// Correlator
// ---------------------------------------------------------------------------

/// One live-at-a-time listen cycle over a shared channel.
pub(crate) struct Correlator<C: ChannelAdapter, P: TerminationPolicy> {
    channel: C,
    config: WatchConfig,
    policy: Arc<P>,
    inner: Arc<Mutex<Inner>>,
    id: Uuid,
}

struct Inner {
    generation: u64,
    cycle: Option<Cycle>,
}

/// Handles owned for the duration of one listen cycle.
struct Cycle {
    request_id: String,
    timer: Option<TimerHandle>,
    stop: Option<oneshot::Sender<&'static str>>,
}

impl<C: ChannelAdapter, P: TerminationPolicy> Correlator<C, P> {
    pub(crate) fn new(channel: C, config: WatchConfig, policy: Arc<P>) -> Self {
        Self {
            channel,
            config,
            policy,
            inner: Arc::new(Mutex::new(Inner {
                generation: 0,
                cycle: None,
            })),
            id: Uuid::new_v4(),
        }
    }

    pub(crate) fn is_listening(&self) -> bool {
        lock_state(&self.inner).cycle.is_some()
    }

    /// Begin a new listen cycle, superseding any live one without firing its
    /// callback. A zero `timeout` arms no deadline.
    pub(crate) async fn start(&self, request_id: String, timeout: Duration) -> Result<()> {
        if request_id.is_empty() {
            return Err(Error::EmptyRequestId);
        }

        // Teardown of the old cycle and the generation bump happen in one
        // critical section, before the new subscribe goes out.
        let generation = {
            let mut inner = lock_state(&self.inner);
            teardown(&mut inner, "superseded");
            self.policy.reset();
            inner.generation += 1;
            inner.generation
        };

        let filter = ChannelFilter::new(
            self.config.tenant_code.clone(),
            self.config.action.clone(),
            request_id.clone(),
        );
        let mut subscription = self.channel.subscribe(filter).await?;

        let (stop_tx, stop_rx) = oneshot::channel();
        {
            let mut inner = lock_state(&self.inner);
            if inner.generation != generation {
                // A later start won the race while our subscribe was in
                // flight; this cycle never existed.
                drop(inner);
                debug!(
                    watcher_id = %self.id,
                    request_id,
                    generation,
                    "superseded while subscribing, discarding fresh subscription"
                );
                subscription.unsubscribe();
                return Ok(());
            }
            let timer = timer::arm(timeout, {
                let inner = Arc::clone(&self.inner);
                let policy = Arc::clone(&self.policy);
                let request_id = request_id.clone();
                move || on_deadline(inner, policy, generation, request_id)
            });
            inner.cycle = Some(Cycle {
                request_id: request_id.clone(),
                timer,
                stop: Some(stop_tx),
            });
        }

        info!(
            watcher_id = %self.id,
            request_id,
            generation,
            timeout_ms = timeout.as_millis() as u64,
            "listening for command completion"
        );

        let span = telemetry::listen_span(&self.id, &request_id, generation);
        tokio::spawn(
            listen(
                subscription,
                stop_rx,
                Arc::clone(&self.inner),
                Arc::clone(&self.policy),
                generation,
                request_id,
            )
            .instrument(span),
        );

        Ok(())
    }

    /// Tear down the live cycle, if any, and clear the policy's
    /// accumulators, in one critical section. No callback fires.
    pub(crate) fn stop(&self) {
        let mut inner = lock_state(&self.inner);
        teardown(&mut inner, "stopped");
        self.policy.reset();
    }
}

impl<C: ChannelAdapter, P: TerminationPolicy> Drop for Correlator<C, P> {
    fn drop(&mut self) {
        let mut inner = lock_state(&self.inner);
        teardown(&mut inner, "dropped");
    }
}

/// Lock the state, recovering the guard if a prior panic poisoned it.
fn lock_state(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Release the live cycle's handles. Runs under the state lock; fires no
/// callbacks.
fn teardown(inner: &mut Inner, reason: &'static str) {
    if let Some(mut cycle) = inner.cycle.take() {
        if let Some(mut timer) = cycle.timer.take() {
            timer.disarm();
        }
        if let Some(stop) = cycle.stop.take() {
            let _ = stop.send(reason);
        }
        debug!(request_id = %cycle.request_id, reason, "listen cycle torn down");
    }
}

/// End the live cycle from inside the listen task: disarm the timer and
/// clear the cycle. The task itself unsubscribes as it exits.
fn complete_cycle(inner: &mut Inner) {
    if let Some(mut cycle) = inner.cycle.take() {
        if let Some(mut timer) = cycle.timer.take() {
            timer.disarm();
        }
    }
}

/// Timer-fire handler. Validates liveness under the lock, then reports the
/// timeout outside it.
fn on_deadline<P: TerminationPolicy>(
    inner: Arc<Mutex<Inner>>,
    policy: Arc<P>,
    generation: u64,
    request_id: String,
) {
    {
        let mut guard = lock_state(&inner);
        if guard.generation != generation {
            trace!(request_id, generation, "stale deadline, a newer cycle is live");
            return;
        }
        let Some(mut cycle) = guard.cycle.take() else {
            trace!(request_id, generation, "deadline fired after the cycle ended");
            return;
        };
        if let Some(stop) = cycle.stop.take() {
            let _ = stop.send("timeout");
        }
    }
    info!(request_id, generation, "timed out waiting for command completion");
    policy.notify_timeout();
}

/// How one message left the listen loop.
enum Absorbed {
    /// Consumed or ignored; keep listening.
    Listening,
    /// Terminal match ended the cycle.
    Finished,
    /// The cycle this task served is gone.
    Stale,
}

/// Pending callback, decided under the lock, fired after it is released.
enum Emit {
    Nothing(Absorbed),
    Progress(Message, CommandStatus),
    Complete(Message),
}

/// Run one message through the serialization point.
fn absorb<P: TerminationPolicy>(
    inner: &Mutex<Inner>,
    policy: &Arc<P>,
    generation: u64,
    request_id: &str,
    message: Message,
) -> Absorbed {
    let emit = {
        let mut guard = lock_state(inner);
        if guard.generation != generation || guard.cycle.is_none() {
            trace!(message_id = %message.id, "message for a finished cycle, ignoring");
            Emit::Nothing(Absorbed::Stale)
        } else if message.id != request_id {
            debug!(message_id = %message.id, "message for another request, ignoring");
            Emit::Nothing(Absorbed::Listening)
        } else {
            let status = CommandStatus::parse(message.status().unwrap_or(""));
            match policy.absorb(&message, status) {
                Verdict::Continue => Emit::Progress(message, status),
                Verdict::Complete => {
                    complete_cycle(&mut guard);
                    Emit::Complete(message)
                }
            }
        }
    };

    match emit {
        Emit::Nothing(absorbed) => absorbed,
        Emit::Progress(message, status) => {
            policy.notify_progress(&message, status);
            Absorbed::Listening
        }
        Emit::Complete(message) => {
            info!(request_id, "command finished");
            policy.notify_complete(message);
            Absorbed::Finished
        }
    }
}

/// Receive loop for one cycle. Owns the subscription; exits on stop signal,
/// terminal completion, or transport close, unsubscribing on the way out.
async fn listen<S: Subscription, P: TerminationPolicy>(
    mut subscription: S,
    mut stop_rx: oneshot::Receiver<&'static str>,
    inner: Arc<Mutex<Inner>>,
    policy: Arc<P>,
    generation: u64,
    request_id: String,
) {
    loop {
        tokio::select! {
            reason = &mut stop_rx => {
                let reason = reason.unwrap_or("stopped");
                debug!(reason, "listen cycle stopped");
                telemetry::record_outcome(&tracing::Span::current(), reason);
                break;
            }
            next = subscription.recv() => {
                let Some(message) = next else {
                    warn!("channel closed while listening");
                    telemetry::record_outcome(&tracing::Span::current(), "channel_closed");
                    break;
                };
                match absorb(&inner, &policy, generation, &request_id, message) {
                    Absorbed::Listening => {}
                    Absorbed::Finished => {
                        telemetry::record_outcome(&tracing::Span::current(), "finished");
                        break;
                    }
                    Absorbed::Stale => break,
                }
            }
        }
    }
    subscription.unsubscribe();
}
