use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No progress within the worker timeout
    Timeout,
    /// Killed by the OS after hitting its data-segment ceiling
    MemoryExceeded,
    /// Any other unexpected exit
    Crashed,
    /// Asked to stop by the foreman
    Shutdown,
    /// Killed because the run was aborted
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Terminated(TerminationReason),
}

/// Governor-side record of one worker generation.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub identifier: String,
    pub pid: u32,
    /// Number of times this worker slot was spawned before
    pub generation: u32,
    pub spawn_time: DateTime<Utc>,
    /// Data-segment ceiling in bytes, 0 = unlimited
    pub memory_limit: u64,
    pub last_seen: DateTime<Utc>,
    /// Set while the worker holds a task
    pub task_assigned_at: Option<DateTime<Utc>>,
    state: WorkerState,
}

impl WorkerHandle {
    pub fn new(identifier: &str, pid: u32, generation: u32, memory_limit: u64, now: DateTime<Utc>) -> Self {
        Self {
            identifier: identifier.to_string(),
            pid,
            generation,
            spawn_time: now,
            memory_limit,
            last_seen: now,
            task_assigned_at: None,
            state: WorkerState::Starting,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// STARTING -> RUNNING once the worker reported in
    pub fn mark_running(&mut self, pid: u32, now: DateTime<Utc>) {
        if self.state == WorkerState::Starting {
            self.pid = pid;
            self.state = WorkerState::Running;
        }
        self.last_seen = now;
    }

    /// Record the termination reason. The first reason sticks; returns false
    /// when the worker was already terminated.
    pub fn mark_terminated(&mut self, reason: TerminationReason) -> bool {
        if self.is_terminated() {
            return false;
        }
        self.state = WorkerState::Terminated(reason);
        self.task_assigned_at = None;
        true
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_seen = now;
    }

    pub fn assign_task(&mut self, now: DateTime<Utc>) {
        self.task_assigned_at = Some(now);
    }

    pub fn clear_task(&mut self) {
        self.task_assigned_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.state == WorkerState::Running
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, WorkerState::Terminated(_))
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self.state {
            WorkerState::Terminated(reason) => Some(reason),
            _ => None,
        }
    }
}
