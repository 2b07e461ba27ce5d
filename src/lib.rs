//! # cmdwatch
//!
//! Correlates long-running backend commands with their completion events
//! on a shared push channel.
//!
//! A command is issued over plain HTTP and acknowledged with only an opaque
//! request id; a pub/sub channel then carries status events for every
//! in-flight command in the tenant. Watchers subscribe through a channel
//! adapter, match events by request id, classify their status strings, and
//! fire the caller's callback on completion or timeout, keeping
//! subscription and timer lifecycle leak-free across rapid restarts.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod status;
pub mod telemetry;
pub mod timer;
