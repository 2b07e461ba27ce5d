//! Correlation engine: one generic core, two termination policies.
//!
//! [`single::CommandWatcher`] completes on the first terminal status;
//! [`bulk::BulkCommandWatcher`] accumulates until the caller stops it. Both
//! wrap the same core, which owns the cycle state and the stale-callback
//! guards.

mod core;

pub mod bulk;
pub mod single;

pub use bulk::BulkCommandWatcher;
pub use single::CommandWatcher;
