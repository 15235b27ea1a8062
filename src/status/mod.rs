//! Status model of an extraction run.
//!
//! - [`ProcessStatus`]: counters, deltas and liveness of one process
//! - [`ProcessingStatus`]: the foreman-owned aggregate
//! - [`StatusTotals`]: side-effect-free run-wide totals
//! - [`view`]: presentation of the aggregate

mod process_status;
mod processing_status;
mod totals;

/// Status views (linear, window, none)
pub mod view;

pub use process_status::{Counter, CounterDeltas, ProcessCounters, ProcessStatus, StatusSnapshot};
pub use processing_status::ProcessingStatus;
pub use totals::StatusTotals;
