//! Integration tests for the single-completion watcher.
//!
//! Tests run on a paused runtime and drive the hub directly; `settle` yields
//! long enough for the listen task chain to quiesce.

use std::sync::Arc;
use std::time::Duration;

use cmdwatch::channel::memory::InMemoryChannel;
use cmdwatch::config::WatchConfig;
use cmdwatch::engine::CommandWatcher;
use cmdwatch::error::Error;
use cmdwatch::model::Message;
use cmdwatch::status::CommandStatus;
use serde_json::Map;
use tokio::sync::mpsc;
use tokio::time::sleep;

const TENANT: &str = "acme";
const ACTION: &str = "COMMAND_STATUS";

fn watcher(hub: &InMemoryChannel) -> CommandWatcher<InMemoryChannel> {
    CommandWatcher::new(hub.clone(), WatchConfig::new(TENANT))
}

fn finished(id: &str) -> Message {
    Message::with_status(id, "finish:FINISHED")
}

/// Route the done callback into a channel the test can poll.
fn capture_done(
    watcher: &CommandWatcher<InMemoryChannel>,
) -> mpsc::UnboundedReceiver<Option<Message>> {
    let (tx, rx) = mpsc::unbounded_channel();
    watcher.on_done(move |outcome| {
        let _ = tx.send(outcome);
    });
    rx
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Terminal completion
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn terminal_match_fires_done_once_and_goes_idle() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::from_secs(30)).await.unwrap();
    assert!(w.is_listening());

    assert_eq!(hub.publish(TENANT, ACTION, finished("req-1")), 1);
    settle().await;

    let outcome = done.recv().await.expect("done should fire");
    let message = outcome.expect("completion carries the terminal message");
    assert_eq!(message.id, "req-1");
    assert!(!w.is_listening());
    assert_eq!(hub.subscriber_count(), 0);

    // Nothing is listening any more.
    assert_eq!(hub.publish(TENANT, ACTION, finished("req-1")), 0);
    settle().await;
    assert!(done.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn message_for_another_request_is_inert() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::ZERO).await.unwrap();
    hub.publish(TENANT, ACTION, finished("req-2"));
    settle().await;

    assert!(done.try_recv().is_err());
    assert!(w.is_listening());
}

// ---------------------------------------------------------------------------
// Deadlines
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timeout_fires_done_none_exactly_once() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::from_millis(50)).await.unwrap();

    sleep(Duration::from_millis(60)).await;
    settle().await;

    assert_eq!(done.recv().await.expect("done should fire"), None);
    assert!(!w.is_listening());
    assert_eq!(hub.subscriber_count(), 0);

    // A terminal arriving after the deadline reaches no one.
    hub.publish(TENANT, ACTION, finished("req-1"));
    settle().await;
    assert!(done.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn zero_timeout_never_expires() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::ZERO).await.unwrap();

    sleep(Duration::from_secs(24 * 60 * 60)).await;
    settle().await;
    assert!(done.try_recv().is_err());
    assert!(w.is_listening());

    hub.publish(TENANT, ACTION, finished("req-1"));
    settle().await;
    assert!(matches!(done.recv().await, Some(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn transport_close_leaves_the_cycle_armed_until_timeout() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::from_millis(50)).await.unwrap();
    hub.disconnect_all();
    settle().await;

    // The stream ended, but the cycle holds until the deadline decides.
    assert!(w.is_listening());
    assert_eq!(hub.subscriber_count(), 0);
    assert!(done.try_recv().is_err());

    sleep(Duration::from_millis(60)).await;
    settle().await;
    assert_eq!(done.recv().await.expect("done should fire"), None);
    assert!(!w.is_listening());
}

#[tokio::test(start_paused = true)]
async fn late_timer_after_completion_is_a_silent_no_op() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::from_millis(50)).await.unwrap();
    hub.publish(TENANT, ACTION, finished("req-1"));
    settle().await;
    assert!(matches!(done.recv().await, Some(Some(_))));

    // Let the original deadline pass; completion already disarmed it.
    sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(done.try_recv().is_err());
}

// ---------------------------------------------------------------------------
// Restart semantics
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn restart_abandons_the_previous_cycle() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-a", Duration::ZERO).await.unwrap();
    w.start("req-b", Duration::ZERO).await.unwrap();
    settle().await;
    assert_eq!(hub.subscriber_count(), 1);

    // The superseded request's terminal means nothing to this watcher.
    hub.publish(TENANT, ACTION, finished("req-a"));
    settle().await;
    assert!(done.try_recv().is_err());

    hub.publish(TENANT, ACTION, finished("req-b"));
    settle().await;
    let message = done
        .recv()
        .await
        .expect("done should fire")
        .expect("with the terminal message");
    assert_eq!(message.id, "req-b");
}

#[tokio::test(start_paused = true)]
async fn restart_disarms_the_superseded_deadline() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-a", Duration::from_millis(50)).await.unwrap();
    w.start("req-b", Duration::ZERO).await.unwrap();

    sleep(Duration::from_millis(200)).await;
    settle().await;

    assert!(done.try_recv().is_err());
    assert!(w.is_listening());
}

// ---------------------------------------------------------------------------
// Failures and edge input
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn subscribe_failure_surfaces_and_stays_idle() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    hub.reject_subscriptions("broker unavailable");
    let err = w
        .start("req-1", Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Subscribe(_)));
    assert!(!w.is_listening());

    // The failed start armed no deadline.
    sleep(Duration::from_millis(200)).await;
    settle().await;
    assert!(done.try_recv().is_err());
}

#[tokio::test]
async fn empty_request_id_is_rejected() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);

    let err = w.start("", Duration::ZERO).await.unwrap_err();
    assert!(matches!(err, Error::EmptyRequestId));
    assert!(!w.is_listening());
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_status_is_intermediate() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut done = capture_done(&w);

    w.start("req-1", Duration::ZERO).await.unwrap();

    // No status field at all, then a colonless one. Neither completes.
    hub.publish(TENANT, ACTION, Message::new("req-1", Map::new()));
    hub.publish(TENANT, ACTION, Message::with_status("req-1", "finished"));
    settle().await;

    assert!(done.try_recv().is_err());
    assert!(w.is_listening());
}

// ---------------------------------------------------------------------------
// Callback slots
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn progress_observer_sees_intermediate_statuses() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let (tx, mut rx) = mpsc::unbounded_channel();
    w.on_progress(move |message, status| {
        let _ = tx.send((message.id.clone(), status));
    });

    w.start("req-1", Duration::ZERO).await.unwrap();
    hub.publish(
        TENANT,
        ACTION,
        Message::with_status("req-1", "check_version:STARTED"),
    );
    hub.publish(TENANT, ACTION, Message::with_status("req-1", "apply:RUNNING"));
    settle().await;

    assert_eq!(
        rx.try_recv().unwrap(),
        ("req-1".to_string(), CommandStatus::Started)
    );
    assert_eq!(
        rx.try_recv().unwrap(),
        ("req-1".to_string(), CommandStatus::Other)
    );
    assert!(w.is_listening());
}

#[tokio::test(start_paused = true)]
async fn latest_done_callback_wins() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    let mut first = capture_done(&w);

    w.start("req-1", Duration::ZERO).await.unwrap();

    // Registered mid-cycle: the live cycle must invoke this one, not a
    // snapshot taken at start.
    let mut second = capture_done(&w);
    hub.publish(TENANT, ACTION, finished("req-1"));
    settle().await;

    assert!(first.try_recv().is_err());
    assert!(matches!(second.recv().await, Some(Some(_))));
}

#[tokio::test(start_paused = true)]
async fn done_callback_can_restart_the_watcher() {
    let hub = InMemoryChannel::new();
    let w = Arc::new(watcher(&hub));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let restarter = Arc::clone(&w);
    w.on_done(move |outcome| {
        let _ = tx.send(outcome);
        let restarter = Arc::clone(&restarter);
        tokio::spawn(async move {
            restarter
                .start("req-2", Duration::ZERO)
                .await
                .expect("restart from inside the done callback");
        });
    });

    w.start("req-1", Duration::ZERO).await.unwrap();
    hub.publish(TENANT, ACTION, finished("req-1"));
    settle().await;

    assert!(matches!(rx.try_recv(), Ok(Some(_))));
    assert!(w.is_listening());
    assert_eq!(hub.subscriber_count(), 1);

    hub.publish(TENANT, ACTION, finished("req-2"));
    settle().await;
    assert!(matches!(rx.try_recv(), Ok(Some(_))));
}

// ---------------------------------------------------------------------------
// Disposal
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn dropping_the_watcher_releases_the_subscription() {
    let hub = InMemoryChannel::new();
    let w = watcher(&hub);
    w.start("req-1", Duration::ZERO).await.unwrap();
    assert_eq!(hub.subscriber_count(), 1);

    drop(w);
    settle().await;
    assert_eq!(hub.subscriber_count(), 0);
}
