//! Resource governor.
//!
//! Memory ceilings are applied once per process at start and enforced by
//! the OS. Liveness is judged by the foreman on every poll from the wall
//! clock and the status model's `last_running_time`.

mod handle;
mod liveness;
mod memory;

pub use handle::{TerminationReason, WorkerHandle, WorkerState};
pub use liveness::LivenessMonitor;
pub use memory::{apply_memory_limit, classify_exit, MemorySampler};
