//! Collaborators of the extraction engine.
//!
//! The engine never enumerates, parses or stores anything itself. It is
//! handed a [`PathSpecSource`] that yields units of work, a
//! [`TaskProcessor`] that turns one path specification into timeline
//! events, and a [`SinkFactory`] that opens one [`EventSink`] per process.
//!
//! ## Reference implementations
//!
//! - [`DirectorySource`] / [`StaticSource`]
//! - [`FileStatProcessor`]: file-system timestamps plus an optional SHA-256
//! - [`JsonLinesSinkFactory`] / [`MemorySinkFactory`]

use anyhow::Result;

use crate::models::{ExtractionWarning, PathSpec, TimelineEvent};
use crate::worker::ExtractionContext;

mod filestat;
mod sink;
mod source;

pub use filestat::FileStatProcessor;
pub use sink::{JsonLinesSinkFactory, MemoryRecords, MemorySinkFactory};
pub use source::{DirectorySource, StaticSource};

/// Producer of path specifications; runs on its own thread.
pub trait PathSpecSource: Send {
    fn path_specs(&self) -> Box<dyn Iterator<Item = Result<PathSpec>> + Send + '_>;
}

/// Processing callback invoked once per task.
///
/// An `Err` is reported as an extraction warning and the task still
/// completes. A panic takes the worker down with it.
pub trait TaskProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process(&self, path_spec: &PathSpec, context: &mut ExtractionContext<'_>) -> Result<()>;
}

/// Per-process output for events and warnings.
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send {
    fn write_event(&mut self, event: &TimelineEvent) -> Result<()>;

    fn write_warning(&mut self, warning: &ExtractionWarning) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

pub trait SinkFactory: Send + Sync {
    /// Open the sink of the process named `identifier`
    fn open(&self, identifier: &str) -> Result<Box<dyn EventSink>>;
}
