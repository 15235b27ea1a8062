//! Task transport between the foreman and its workers.
//!
//! Two interchangeable backends sit behind [`WorkerTransport`]:
//!
//! - message-queue (feature `message_queue`): one child process per
//!   worker, newline-delimited JSON over its stdin and stdout
//! - local-queue: one thread per worker, crossbeam channels
//!
//! Either way every worker message lands on the foreman's single event
//! channel tagged with the worker's identifier and generation, so the
//! foreman can drop whatever a replaced worker still had in flight.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

use crate::engine::{Task, TaskId};
use crate::governor::TerminationReason;
use crate::models::PathSpec;
use crate::status::StatusSnapshot;

mod local;
#[cfg(feature = "message_queue")]
mod message_queue;

pub use local::LocalTransport;
#[cfg(feature = "message_queue")]
pub use message_queue::MessageQueueTransport;

/// Foreman to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForemanMessage {
    Task(Task),
    Shutdown,
}

/// Worker to foreman.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    Started { pid: u32 },
    Status(StatusSnapshot),
    SourceProduced { path_spec: PathSpec },
    TaskCompleted { task_id: TaskId, events: u64, errors: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Message(WorkerMessage),
    /// The worker's side of the transport closed
    Disconnected,
}

/// A worker message as seen by the foreman.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub identifier: String,
    pub generation: u32,
    pub kind: TransportEventKind,
}

impl TransportEvent {
    pub fn message(identifier: &str, generation: u32, message: WorkerMessage) -> Self {
        Self {
            identifier: identifier.to_string(),
            generation,
            kind: TransportEventKind::Message(message),
        }
    }

    pub fn disconnected(identifier: &str, generation: u32) -> Self {
        Self {
            identifier: identifier.to_string(),
            generation,
            kind: TransportEventKind::Disconnected,
        }
    }
}

/// Everything a transport needs to start one worker.
#[derive(Debug, Clone)]
pub struct WorkerLaunch {
    pub identifier: String,
    pub generation: u32,
    /// Bytes, 0 = unlimited
    pub memory_limit: u64,
    pub status_update_items: u64,
    pub status_update_interval: Duration,
}

pub trait WorkerTransport {
    fn name(&self) -> &'static str;

    /// Whether workers run in their own address space, and so get their
    /// own memory ceiling and memory samples
    fn isolates_workers(&self) -> bool;

    /// Start a worker whose messages are forwarded onto `events`
    fn spawn(&self, launch: &WorkerLaunch, events: Sender<TransportEvent>) -> Result<Box<dyn WorkerLink>>;
}

/// Foreman side of one running worker.
pub trait WorkerLink: Send {
    fn pid(&self) -> u32;

    fn send(&mut self, message: &ForemanMessage) -> Result<()>;

    /// Stop the worker immediately
    fn terminate(&mut self);

    /// Wait for the worker to end and report how it ended
    fn reap(&mut self) -> TerminationReason;
}

/// Command line that starts a worker process: the program, arguments for
/// the hidden `worker` subcommand are appended by the transport, then
/// `args`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
        }
    }

    /// Re-invoke the running executable
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe().context("Failed to locate the running executable")?;
        Ok(Self::new(program))
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}
