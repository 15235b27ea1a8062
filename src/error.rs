//! Error taxonomy of the extraction engine.
//!
//! Only [`EngineError::Configuration`] and [`EngineError::WorkerSpawn`] end a
//! run. Every other variant describes a per-process fault that the foreman
//! recovers from and records as an incident.

use thiserror::Error;

use crate::status::Counter;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Counter regression for {identifier}: {counter} went from {previous} to {current}")]
    CounterRegression {
        identifier: String,
        counter: Counter,
        previous: u64,
        current: u64,
    },

    #[error("Worker {identifier} made no progress for {idle_seconds:.1} seconds")]
    WorkerStaleness { identifier: String, idle_seconds: f64 },

    #[error("Worker {identifier} (PID {pid}) was killed after exceeding its memory limit")]
    WorkerMemoryExceeded { identifier: String, pid: u32 },

    #[error("Worker {identifier} (PID {pid}) exited unexpectedly")]
    WorkerCrashed { identifier: String, pid: u32 },

    #[error("Task {task_id} ({path_spec}) abandoned after {attempts} failed attempts")]
    TaskAbandoned {
        task_id: u64,
        path_spec: String,
        attempts: u32,
    },

    #[error("Unable to start worker {identifier}: {detail}")]
    WorkerSpawn { identifier: String, detail: String },

    #[error("Transport failure: {0}")]
    Transport(String),
}
