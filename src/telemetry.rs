//! Listen-scoped span helpers.
//!
//! One span covers one listen cycle, from subscribe to teardown. The outcome
//! field is recorded when the cycle ends, so log pipelines can group every
//! message a cycle saw under how it ended.

use tracing::{Span, info_span};
use uuid::Uuid;

/// Span covering one listen cycle.
pub fn listen_span(watcher_id: &Uuid, request_id: &str, generation: u64) -> Span {
    info_span!(
        "watch.listen",
        watcher_id = %watcher_id,
        request_id,
        generation,
        outcome = tracing::field::Empty,
    )
}

/// Record how a cycle ended: `finished`, `timeout`, `stopped`, `superseded`,
/// `dropped`, or `channel_closed`.
pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("outcome", outcome);
}
