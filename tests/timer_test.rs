//! Integration tests for the one-shot deadline timer.
//!
//! All tests run on a paused runtime, so sleeps advance the mock clock
//! instantly.

use std::time::Duration;

use cmdwatch::timer;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::sleep;

#[tokio::test(start_paused = true)]
async fn fires_once_after_the_deadline() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = timer::arm(Duration::from_millis(50), move || {
        let _ = tx.send(());
    });

    sleep(Duration::from_millis(10)).await;
    assert!(rx.try_recv().is_err(), "deadline has not passed yet");

    sleep(Duration::from_millis(50)).await;
    rx.recv().await.expect("timer should fire");

    sleep(Duration::from_millis(200)).await;
    assert!(rx.try_recv().is_err(), "a one-shot timer fires once");
}

#[tokio::test(start_paused = true)]
async fn zero_duration_means_no_timer() {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let handle = timer::arm(Duration::ZERO, move || {
        let _ = tx.send(());
    });
    assert!(handle.is_none());

    sleep(Duration::from_secs(24 * 60 * 60)).await;
    assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn disarm_prevents_the_fire() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut handle = timer::arm(Duration::from_millis(50), move || {
        let _ = tx.send(());
    })
    .expect("nonzero duration arms a timer");

    sleep(Duration::from_millis(10)).await;
    handle.disarm();
    handle.disarm();

    sleep(Duration::from_millis(200)).await;
    assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_handle_disarms() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = timer::arm(Duration::from_millis(50), move || {
        let _ = tx.send(());
    });
    drop(handle);

    sleep(Duration::from_millis(200)).await;
    assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
}
