//! Worker loop.
//!
//! A worker pulls tasks from its endpoint until told to shut down, runs the
//! processor on each one and publishes sampled status snapshots. The same
//! loop runs inside a worker process (message-queue transport) and on a
//! worker thread (local-queue transport); single-process mode reuses
//! [`execute_task`] directly.

use std::time::Duration;

use anyhow::Result;
use log::{debug, info, warn};

use crate::constants::{STATUS_COMPLETED, STATUS_EXTRACTING, STATUS_IDLE};
use crate::engine::Task;
use crate::extractors::{EventSink, TaskProcessor};
use crate::models::ExtractionWarning;
use crate::status::{ProcessCounters, StatusSnapshot};
use crate::transport::{ForemanMessage, WorkerMessage};

mod context;
mod endpoint;

pub use context::{ExtractionContext, ProcessState, StatusCadence, StatusPublisher, TaskOutcome};
pub use endpoint::{StdioEndpoint, WorkerEndpoint};

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub identifier: String,
    pub pid: u32,
    pub status_update_items: u64,
    pub status_update_interval: Duration,
}

/// Run one task against `processor`, updating `state` as a worker would.
///
/// A processor error becomes an extraction warning; only sink failures
/// make the task itself fail.
pub fn execute_task(
    processor: &dyn TaskProcessor,
    task: &Task,
    state: &mut ProcessState,
    sink: &mut dyn EventSink,
    cadence: &mut StatusCadence,
    publisher: &mut dyn StatusPublisher,
) -> Result<TaskOutcome> {
    state.status = STATUS_EXTRACTING.to_string();
    state.display_name = task.path_spec.to_string();

    let outcome = {
        let mut context = ExtractionContext::new(state, sink, cadence, publisher);
        if let Err(e) = processor.process(&task.path_spec, &mut context) {
            warn!("{} failed on {}: {:#}", processor.name(), task.path_spec, e);
            context.produce_warning(ExtractionWarning::new(
                task.path_spec.clone(),
                processor.name(),
                format!("{:#}", e),
            ))?;
        }
        context.finish()
    };
    sink.flush()?;

    state.counters.consumed_sources += 1;
    state.status = STATUS_IDLE.to_string();
    state.display_name.clear();
    Ok(outcome)
}

struct EndpointPublisher<'a, E: WorkerEndpoint>(&'a mut E);

impl<E: WorkerEndpoint> StatusPublisher for EndpointPublisher<'_, E> {
    fn publish(&mut self, snapshot: StatusSnapshot) -> Result<()> {
        self.0.send(WorkerMessage::Status(snapshot))
    }
}

/// Serve tasks from `endpoint` until shutdown or until the foreman goes away.
///
/// # Returns
///
/// The final counters of this worker.
pub fn run_worker<E: WorkerEndpoint>(
    mut endpoint: E,
    settings: &WorkerSettings,
    processor: &dyn TaskProcessor,
    mut sink: Box<dyn EventSink>,
) -> Result<ProcessCounters> {
    let mut state = ProcessState::new(&settings.identifier, settings.pid, STATUS_IDLE);
    let mut cadence = StatusCadence::new(settings.status_update_items, settings.status_update_interval);

    endpoint.send(WorkerMessage::Started { pid: settings.pid })?;
    endpoint.send(WorkerMessage::Status(state.snapshot()))?;
    info!("Worker {} (PID {}) started", settings.identifier, settings.pid);

    while let Some(message) = endpoint.receive()? {
        let task = match message {
            ForemanMessage::Task(task) => task,
            ForemanMessage::Shutdown => {
                debug!("Worker {} asked to shut down", settings.identifier);
                break;
            }
        };

        debug!("Worker {} processing {}", settings.identifier, task.path_spec);
        let outcome = {
            let mut publisher = EndpointPublisher(&mut endpoint);
            execute_task(processor, &task, &mut state, sink.as_mut(), &mut cadence, &mut publisher)?
        };

        for path_spec in outcome.produced_sources {
            endpoint.send(WorkerMessage::SourceProduced { path_spec })?;
        }
        endpoint.send(WorkerMessage::Status(state.snapshot()))?;
        cadence.reset();
        endpoint.send(WorkerMessage::TaskCompleted {
            task_id: task.id,
            events: outcome.events,
            errors: outcome.errors,
        })?;
    }

    sink.flush()?;
    state.status = STATUS_COMPLETED.to_string();
    if let Err(e) = endpoint.send(WorkerMessage::Status(state.snapshot())) {
        debug!("Final status of {} not delivered: {:#}", settings.identifier, e);
    }

    info!(
        "Worker {} finished: {} sources, {} events, {} errors",
        settings.identifier,
        state.counters.consumed_sources,
        state.counters.produced_events,
        state.counters.produced_errors
    );
    Ok(state.counters)
}
