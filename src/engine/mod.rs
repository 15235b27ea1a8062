//! Extraction engine.
//!
//! [`ExtractionEngine::run`] drives one extraction: the path-specification
//! source feeds a bounded intake queue, the foreman turns each item into a
//! [`Task`], hands tasks to idle workers over the configured transport,
//! folds their status snapshots into a
//! [`ProcessingStatus`](crate::status::ProcessingStatus) and replaces
//! workers that hang, crash or run out of memory. The run ends with a
//! [`ProcessingReport`].
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use rust_extractor::config::ProcessingConfig;
//! use rust_extractor::engine::ExtractionEngine;
//! use rust_extractor::extractors::{DirectorySource, FileStatProcessor, JsonLinesSinkFactory};
//! use rust_extractor::status::view::NullStatusView;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = ExtractionEngine::new(
//!     ProcessingConfig::default(),
//!     Arc::new(FileStatProcessor::new(0)),
//!     Arc::new(JsonLinesSinkFactory::new(Path::new("/tmp/events"))?),
//! );
//! let source = DirectorySource::new(Path::new("/evidence"))?;
//! let report = engine.run(Box::new(source), &mut NullStatusView)?;
//! println!("{} tasks completed", report.completed_tasks);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{info, warn};

use crate::config::{ProcessingConfig, TransportKind};
use crate::extractors::{PathSpecSource, SinkFactory, TaskProcessor};
use crate::status::view::StatusView;
use crate::transport::{LocalTransport, WorkerCommand, WorkerTransport};

mod foreman;
mod intake;
mod report;
mod single;
mod task;

pub use intake::{Intake, IntakeItem};
pub use report::{Incident, IncidentKind, ProcessingReport};
pub use task::{FailureOutcome, Task, TaskId, TaskScheduler, TaskState};

use foreman::Foreman;

/// Shared flag that stops a run from any thread.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

pub struct ExtractionEngine {
    config: ProcessingConfig,
    processor: Arc<dyn TaskProcessor>,
    sinks: Arc<dyn SinkFactory>,
    worker_command: Option<WorkerCommand>,
    abort: AbortHandle,
}

impl ExtractionEngine {
    pub fn new(
        config: ProcessingConfig,
        processor: Arc<dyn TaskProcessor>,
        sinks: Arc<dyn SinkFactory>,
    ) -> Self {
        Self {
            config,
            processor,
            sinks,
            worker_command: None,
            abort: AbortHandle::new(),
        }
    }

    /// Program and extra arguments used to start worker processes.
    /// Required by the message-queue transport.
    pub fn with_worker_command(mut self, command: WorkerCommand) -> Self {
        self.worker_command = Some(command);
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Extract everything `source` yields.
    ///
    /// Worker faults are recovered from and show up as report incidents.
    /// Only a pool that cannot be kept alive, or a sink failure in
    /// single-process mode, ends the run with an error.
    pub fn run(&self, source: Box<dyn PathSpecSource>, view: &mut dyn StatusView) -> Result<ProcessingReport> {
        let started = Utc::now();

        if self.config.single_process {
            let outcome = single::run_single_process(
                &self.config,
                self.processor.as_ref(),
                self.sinks.as_ref(),
                source,
                view,
                &self.abort,
            )?;
            return Ok(outcome.into_report("single-process", started));
        }

        let transport = self.create_transport();
        let mode = transport.name();
        info!(
            "Starting extraction with {} workers over the {} transport",
            self.config.workers, mode
        );

        let intake = Intake::start(source, self.config.queue_depth, self.abort.clone())?;
        let outcome = Foreman::new(&self.config, transport, view, self.abort.clone()).run(intake)?;
        Ok(outcome.into_report(mode, started))
    }

    fn create_transport(&self) -> Box<dyn WorkerTransport> {
        match self.config.transport {
            TransportKind::MessageQueue => match self.message_queue_transport() {
                Some(transport) => transport,
                None => {
                    warn!("Message-queue transport unavailable, using local-queue workers");
                    self.local_transport()
                }
            },
            TransportKind::LocalQueue => self.local_transport(),
        }
    }

    fn local_transport(&self) -> Box<dyn WorkerTransport> {
        Box::new(LocalTransport::new(
            Arc::clone(&self.processor),
            Arc::clone(&self.sinks),
        ))
    }

    #[cfg(feature = "message_queue")]
    fn message_queue_transport(&self) -> Option<Box<dyn WorkerTransport>> {
        let command = self.worker_command.clone()?;
        Some(Box::new(crate::transport::MessageQueueTransport::new(command)))
    }

    #[cfg(not(feature = "message_queue"))]
    fn message_queue_transport(&self) -> Option<Box<dyn WorkerTransport>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::{MemorySinkFactory, StaticSource};
    use crate::status::view::NullStatusView;
    use crate::test_utils::ScriptedProcessor;
    use std::time::Duration;

    fn engine(config: ProcessingConfig, processor: ScriptedProcessor, sinks: &MemorySinkFactory) -> ExtractionEngine {
        ExtractionEngine::new(config, Arc::new(processor), Arc::new(sinks.clone()))
    }

    fn local_config(workers: usize) -> ProcessingConfig {
        ProcessingConfig {
            workers,
            transport: TransportKind::LocalQueue,
            liveness_poll_interval: Duration::from_millis(20),
            ..ProcessingConfig::default()
        }
    }

    #[test]
    fn test_abort_handle_is_shared() {
        let handle = AbortHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_aborted());
        clone.abort();
        assert!(handle.is_aborted());
    }

    #[test]
    fn test_message_queue_without_command_falls_back() {
        let sinks = MemorySinkFactory::new();
        let config = ProcessingConfig {
            transport: TransportKind::MessageQueue,
            ..local_config(1)
        };
        let engine = engine(config, ScriptedProcessor::default(), &sinks);
        assert_eq!(engine.create_transport().name(), "local-queue");
    }

    #[test]
    fn test_single_process_run() {
        let sinks = MemorySinkFactory::new();
        let config = ProcessingConfig {
            single_process: true,
            ..local_config(1)
        };
        let engine = engine(config, ScriptedProcessor::default().with_sources(&["/extra"]), &sinks);

        let source = StaticSource::new(["/a", "/b"]);
        let report = engine.run(Box::new(source), &mut NullStatusView).unwrap();

        assert_eq!(report.mode, "single-process");
        assert!(report.is_complete());
        // "/a" and "/b" each hand back "/extra"
        assert_eq!(report.completed_tasks, 4);
        let foreman = report.status.foreman_status().unwrap();
        assert_eq!(foreman.status, "Completed");
        assert_eq!(foreman.counters().consumed_sources, report.completed_tasks);
        assert_eq!(foreman.counters().produced_sources, 4);
        assert_eq!(sinks.records().events.len(), 8);
    }

    #[test]
    fn test_local_queue_run() {
        let sinks = MemorySinkFactory::new();
        let engine = engine(local_config(3), ScriptedProcessor::default(), &sinks);

        let source = StaticSource::new((0..20).map(|i| format!("/file{}", i)));
        let report = engine.run(Box::new(source), &mut NullStatusView).unwrap();

        assert_eq!(report.mode, "local-queue");
        assert!(report.is_complete());
        assert_eq!(report.completed_tasks, 20);
        assert_eq!(report.totals.counters.consumed_sources, 20);
        assert_eq!(report.totals.counters.produced_events, 40);
        assert_eq!(report.totals.counters.consumed_events, 40);
        assert_eq!(report.totals.counters.produced_sources, 20);
        assert_eq!(sinks.records().events.len(), 40);
        assert!(report.incidents.is_empty());
    }

    #[test]
    fn test_aborted_before_start() {
        let sinks = MemorySinkFactory::new();
        let engine = engine(local_config(2), ScriptedProcessor::default(), &sinks);
        engine.abort_handle().abort();

        let source = StaticSource::new(["/a", "/b"]);
        let report = engine.run(Box::new(source), &mut NullStatusView).unwrap();

        assert!(report.status.aborted);
        assert!(!report.is_complete());
        assert_eq!(report.status.foreman_status().unwrap().status, "Aborted");
    }
}
