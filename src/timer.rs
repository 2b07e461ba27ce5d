//! One-shot timers for listen deadlines.
//!
//! A timer is a spawned task racing a sleep against a cancel signal. The
//! handle disarms on demand or on drop; left alone past the deadline, the
//! callback runs exactly once. A fire that was already dispatched when the
//! disarm arrived is the caller's to tolerate (the engine guards with its
//! generation check).

use std::time::Duration;

use tokio::sync::oneshot;

/// Handle to a pending timer. Dropping it disarms the timer.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: Option<oneshot::Sender<()>>,
}

/// Arm a one-shot timer.
///
/// Returns `None` without spawning anything when `after` is zero: a zero
/// deadline means "no timeout".
pub fn arm<F>(after: Duration, on_fire: F) -> Option<TimerHandle>
where
    F: FnOnce() + Send + 'static,
{
    if after.is_zero() {
        return None;
    }
    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel_rx => {}
            _ = tokio::time::sleep(after) => on_fire(),
        }
    });
    Some(TimerHandle {
        cancel: Some(cancel_tx),
    })
}

impl TimerHandle {
    /// Cancel the pending fire. Idempotent.
    pub fn disarm(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}
