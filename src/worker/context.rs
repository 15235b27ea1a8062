use std::time::{Duration, Instant};

use anyhow::Result;

use crate::extractors::EventSink;
use crate::models::{ExtractionWarning, PathSpec, TimelineEvent};
use crate::status::{ProcessCounters, StatusSnapshot};

/// Receiver of the status snapshots a process publishes about itself.
pub trait StatusPublisher {
    fn publish(&mut self, snapshot: StatusSnapshot) -> Result<()>;
}

/// What a process knows about itself between two snapshots.
#[derive(Debug, Clone)]
pub struct ProcessState {
    pub identifier: String,
    pub pid: u32,
    pub status: String,
    pub display_name: String,
    pub counters: ProcessCounters,
}

impl ProcessState {
    pub fn new(identifier: &str, pid: u32, status: &str) -> Self {
        Self {
            identifier: identifier.to_string(),
            pid,
            status: status.to_string(),
            display_name: String::new(),
            counters: ProcessCounters::default(),
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot::new(
            &self.identifier,
            self.pid,
            &self.status,
            &self.display_name,
            self.counters,
        )
    }
}

/// Sampling of status publication: every `items` processed items or every
/// `interval`, whichever comes first.
#[derive(Debug)]
pub struct StatusCadence {
    items: u64,
    interval: Duration,
    pending: u64,
    last_publish: Instant,
}

impl StatusCadence {
    pub fn new(items: u64, interval: Duration) -> Self {
        Self {
            items: items.max(1),
            interval,
            pending: 0,
            last_publish: Instant::now(),
        }
    }

    /// Count processed items; true once a publication is due
    pub fn record(&mut self, items: u64) -> bool {
        self.pending += items;
        self.is_due()
    }

    pub fn is_due(&self) -> bool {
        self.pending >= self.items || self.last_publish.elapsed() >= self.interval
    }

    pub fn reset(&mut self) {
        self.pending = 0;
        self.last_publish = Instant::now();
    }
}

/// Results of one task that the foreman needs to hear about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskOutcome {
    pub events: u64,
    pub errors: u64,
    pub produced_sources: Vec<PathSpec>,
}

/// Handed to a [`TaskProcessor`](crate::extractors::TaskProcessor) for the
/// duration of one task.
pub struct ExtractionContext<'a> {
    state: &'a mut ProcessState,
    sink: &'a mut dyn EventSink,
    cadence: &'a mut StatusCadence,
    publisher: &'a mut dyn StatusPublisher,
    outcome: TaskOutcome,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(
        state: &'a mut ProcessState,
        sink: &'a mut dyn EventSink,
        cadence: &'a mut StatusCadence,
        publisher: &'a mut dyn StatusPublisher,
    ) -> Self {
        Self {
            state,
            sink,
            cadence,
            publisher,
            outcome: TaskOutcome::default(),
        }
    }

    pub fn produce_event(&mut self, event: TimelineEvent) -> Result<()> {
        self.sink.write_event(&event)?;
        self.state.counters.produced_events += 1;
        self.outcome.events += 1;
        self.record_item()
    }

    pub fn produce_warning(&mut self, warning: ExtractionWarning) -> Result<()> {
        self.sink.write_warning(&warning)?;
        self.state.counters.produced_errors += 1;
        self.outcome.errors += 1;
        self.record_item()
    }

    /// Hand a newly discovered path specification back to the foreman,
    /// which queues it as a task of its own.
    pub fn produce_source(&mut self, path_spec: PathSpec) {
        self.outcome.produced_sources.push(path_spec);
    }

    /// Change the status label, e.g. while hashing
    pub fn set_status(&mut self, status: &str) {
        self.state.status = status.to_string();
    }

    pub fn status(&self) -> &str {
        &self.state.status
    }

    pub fn counters(&self) -> &ProcessCounters {
        &self.state.counters
    }

    fn record_item(&mut self) -> Result<()> {
        if self.cadence.record(1) {
            self.publisher.publish(self.state.snapshot())?;
            self.cadence.reset();
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> TaskOutcome {
        self.outcome
    }
}
