use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::ProcessingConfig;
use crate::constants::{
    FOREMAN_IDENTIFIER, MAX_TASK_REQUEUES, STATUS_ABORTED, STATUS_COMPLETED, STATUS_RUNNING,
};
use crate::engine::report::RunOutcome;
use crate::engine::task::TaskScheduler;
use crate::engine::AbortHandle;
use crate::extractors::{PathSpecSource, SinkFactory, TaskProcessor};
use crate::status::view::StatusView;
use crate::status::{ProcessingStatus, StatusSnapshot};
use crate::worker::{execute_task, ProcessState, StatusCadence, StatusPublisher};

/// Publishes straight into the status model and refreshes the view.
struct InlinePublisher<'a> {
    status: &'a mut ProcessingStatus,
    view: &'a mut dyn StatusView,
}

impl StatusPublisher for InlinePublisher<'_> {
    fn publish(&mut self, snapshot: StatusSnapshot) -> Result<()> {
        self.status.update_foreman_status(&snapshot)?;
        self.view.refresh(self.status);
        Ok(())
    }
}

/// Run every task inside the foreman. No workers, no isolation: a panicking
/// processor takes the whole run down.
pub(crate) fn run_single_process(
    config: &ProcessingConfig,
    processor: &dyn TaskProcessor,
    sinks: &dyn SinkFactory,
    source: Box<dyn PathSpecSource>,
    view: &mut dyn StatusView,
    abort: &AbortHandle,
) -> Result<RunOutcome> {
    let pid = std::process::id();
    let mut status = ProcessingStatus::new();
    status.start_foreman(FOREMAN_IDENTIFIER, pid);

    let mut state = ProcessState::new(FOREMAN_IDENTIFIER, pid, STATUS_RUNNING);
    let mut cadence = StatusCadence::new(config.status_update_items, config.status_update_interval);
    let mut scheduler = TaskScheduler::new(MAX_TASK_REQUEUES);
    let mut sink = sinks
        .open(FOREMAN_IDENTIFIER)
        .context("Failed to open the event sink")?;

    info!("Processing in single-process mode (PID {})", pid);

    {
        let mut publisher = InlinePublisher {
            status: &mut status,
            view,
        };
        publisher.publish(state.snapshot())?;

        let mut path_specs = source.path_specs();
        loop {
            if abort.is_aborted() {
                warn!("Abort requested, stopping");
                publisher.status.mark_aborted();
                break;
            }

            if let Some(task) = scheduler.next_task() {
                let outcome = execute_task(
                    processor,
                    &task,
                    &mut state,
                    sink.as_mut(),
                    &mut cadence,
                    &mut publisher,
                )?;
                scheduler.complete(task.id);

                state.status = STATUS_RUNNING.to_string();
                state.counters.consumed_events += outcome.events;
                state.counters.consumed_errors += outcome.errors;
                for path_spec in outcome.produced_sources {
                    scheduler.submit(path_spec);
                    state.counters.produced_sources += 1;
                }
                if cadence.is_due() {
                    publisher.publish(state.snapshot())?;
                    cadence.reset();
                }
                continue;
            }

            match path_specs.next() {
                Some(Ok(path_spec)) => {
                    scheduler.submit(path_spec);
                    state.counters.produced_sources += 1;
                }
                Some(Err(e)) => {
                    warn!("Source error: {:#}", e);
                    state.counters.produced_errors += 1;
                }
                None => break,
            }
        }

        sink.flush()?;
        state.status = if publisher.status.aborted {
            STATUS_ABORTED.to_string()
        } else {
            STATUS_COMPLETED.to_string()
        };
        publisher.publish(state.snapshot())?;
    }

    info!("Single-process run finished: {} tasks completed", scheduler.completed_count());
    Ok(RunOutcome {
        status,
        incidents: Vec::new(),
        completed_tasks: scheduler.completed_count(),
        abandoned_tasks: 0,
    })
}
