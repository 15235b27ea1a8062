//! Global constants for the rust-extractor application.
//!
//! This module centralizes the documented defaults of the extraction engine.
//! Configuration is resolved against these values exactly once, at startup.

// Memory ceilings
/// Default data-segment limit for worker processes (2GiB)
pub const DEFAULT_WORKER_MEMORY_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

/// Default data-segment limit for the foreman process (4GiB)
pub const DEFAULT_PROCESS_MEMORY_LIMIT: u64 = 4 * 1024 * 1024 * 1024;

// Liveness
/// Minutes a busy worker may go without progress before it is killed
pub const DEFAULT_WORKER_TIMEOUT_MINUTES: f64 = 15.0;

/// Seconds between two liveness polls of the governor
pub const DEFAULT_LIVENESS_POLL_INTERVAL_SECS: f64 = 0.5;

// Task transport
/// Depth of the bounded intake queue between the source and the foreman
pub const DEFAULT_QUEUE_DEPTH: usize = 1000;

/// A worker publishes its status after this many processed items...
pub const DEFAULT_STATUS_UPDATE_ITEMS: u64 = 100;

/// ...or after this many seconds, whichever comes first
pub const DEFAULT_STATUS_UPDATE_INTERVAL_SECS: f64 = 1.0;

/// Number of times a task is requeued after its worker was terminated
pub const MAX_TASK_REQUEUES: u32 = 1;

/// Workers dying before they report in, in a row, before the run gives up
pub const MAX_CONSECUTIVE_SPAWN_FAILURES: u32 = 3;

// Reference processor
/// Files larger than this are not hashed (64MB)
pub const DEFAULT_HASH_MAX_SIZE_MB: u64 = 64;

// Process identifiers
pub const FOREMAN_IDENTIFIER: &str = "foreman";
pub const WORKER_IDENTIFIER_PREFIX: &str = "worker";

// Status indicators
pub const STATUS_IDLE: &str = "Idle";
pub const STATUS_RUNNING: &str = "Running";
pub const STATUS_EXTRACTING: &str = "Extracting";
pub const STATUS_HASHING: &str = "Hashing";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_ABORTED: &str = "Aborted";
pub const STATUS_KILLED: &str = "Killed";

// Default file names
pub const DEFAULT_REPORT_NAME: &str = "extraction-report.json";
pub const DEFAULT_CONFIG_NAME: &str = "extractor.yaml";
pub const EVENT_FILE_EXTENSION: &str = "jsonl";
