use anyhow::Result;
use chrono::Utc;
use crossbeam::channel::{never, tick, unbounded, Receiver, Sender};
use crossbeam::select;
use log::{debug, error, info, warn};

use crate::config::ProcessingConfig;
use crate::constants::{
    FOREMAN_IDENTIFIER, MAX_CONSECUTIVE_SPAWN_FAILURES, MAX_TASK_REQUEUES, STATUS_ABORTED,
    STATUS_COMPLETED, STATUS_KILLED, STATUS_RUNNING, WORKER_IDENTIFIER_PREFIX,
};
use crate::engine::intake::{Intake, IntakeItem};
use crate::engine::report::{Incident, RunOutcome};
use crate::engine::task::{FailureOutcome, Task, TaskId, TaskScheduler};
use crate::engine::AbortHandle;
use crate::error::EngineError;
use crate::governor::{LivenessMonitor, MemorySampler, TerminationReason, WorkerHandle};
use crate::models::PathSpec;
use crate::status::view::StatusView;
use crate::status::{ProcessCounters, ProcessingStatus, StatusSnapshot};
use crate::transport::{
    ForemanMessage, TransportEvent, TransportEventKind, WorkerLaunch, WorkerLink, WorkerMessage,
    WorkerTransport,
};
use crate::worker::ProcessState;

/// One worker position in the pool. A respawn reuses the slot, its
/// identifier and its counters.
struct WorkerSlot {
    identifier: String,
    spawned: u32,
    handle: Option<WorkerHandle>,
    link: Option<Box<dyn WorkerLink>>,
    task: Option<Task>,
    /// Sources reported for the current task, submitted once it completes
    produced: Vec<PathSpec>,
    /// Counters of all earlier generations of this slot
    counter_base: ProcessCounters,
    /// Latest counters applied to the status model
    last_counters: ProcessCounters,
}

impl WorkerSlot {
    fn new(index: usize) -> Self {
        Self {
            identifier: format!("{}-{:02}", WORKER_IDENTIFIER_PREFIX, index),
            spawned: 0,
            handle: None,
            link: None,
            task: None,
            produced: Vec::new(),
            counter_base: ProcessCounters::default(),
            last_counters: ProcessCounters::default(),
        }
    }

    fn generation(&self) -> Option<u32> {
        self.handle.as_ref().map(|handle| handle.generation)
    }

    fn pid(&self) -> u32 {
        self.handle.as_ref().map_or(0, |handle| handle.pid)
    }

    fn is_idle(&self) -> bool {
        self.link.is_some()
            && self.task.is_none()
            && self.handle.as_ref().map_or(false, WorkerHandle::is_running)
    }
}

/// The foreman event loop: sole owner and writer of the [`ProcessingStatus`].
pub(crate) struct Foreman<'a> {
    config: &'a ProcessingConfig,
    transport: Box<dyn WorkerTransport>,
    view: &'a mut dyn StatusView,
    abort: AbortHandle,
    status: ProcessingStatus,
    scheduler: TaskScheduler,
    slots: Vec<WorkerSlot>,
    events: Sender<TransportEvent>,
    inbox: Receiver<TransportEvent>,
    state: ProcessState,
    incidents: Vec<Incident>,
    liveness: LivenessMonitor,
    sampler: MemorySampler,
    spawn_failures: u32,
    last_spawn_error: Option<String>,
    source_exhausted: bool,
    shutting_down: bool,
}

impl<'a> Foreman<'a> {
    pub(crate) fn new(
        config: &'a ProcessingConfig,
        transport: Box<dyn WorkerTransport>,
        view: &'a mut dyn StatusView,
        abort: AbortHandle,
    ) -> Self {
        let (events, inbox) = unbounded();

        Self {
            config,
            transport,
            view,
            abort,
            status: ProcessingStatus::new(),
            scheduler: TaskScheduler::new(MAX_TASK_REQUEUES),
            slots: (0..config.workers).map(WorkerSlot::new).collect(),
            events,
            inbox,
            state: ProcessState::new(FOREMAN_IDENTIFIER, std::process::id(), STATUS_RUNNING),
            incidents: Vec::new(),
            liveness: LivenessMonitor::new(config.worker_timeout),
            sampler: MemorySampler::new(),
            spawn_failures: 0,
            last_spawn_error: None,
            source_exhausted: false,
            shutting_down: false,
        }
    }

    /// Run until the source is exhausted and every task is done, or until
    /// the run is aborted.
    pub(crate) fn run(mut self, intake: Intake) -> Result<RunOutcome> {
        self.status.start_foreman(FOREMAN_IDENTIFIER, self.state.pid);
        self.publish_own_status();
        info!(
            "Foreman (PID {}) running {} workers over {}",
            self.state.pid,
            self.slots.len(),
            self.transport.name()
        );

        let result = self.event_loop(intake.receiver());
        if let Err(e) = result {
            self.hard_terminate();
            intake.close();
            return Err(e);
        }

        let handed_over = intake.close();
        debug!("Source handed over {} path specifications", handed_over);
        self.shutdown_workers();

        self.state.status = if self.status.aborted {
            STATUS_ABORTED.to_string()
        } else {
            STATUS_COMPLETED.to_string()
        };
        self.publish_own_status();
        self.view.refresh(&self.status);

        Ok(RunOutcome {
            completed_tasks: self.scheduler.completed_count(),
            abandoned_tasks: self.scheduler.abandoned_count(),
            status: self.status,
            incidents: self.incidents,
        })
    }

    fn event_loop(&mut self, intake: &Receiver<IntakeItem>) -> Result<()> {
        let inbox = self.inbox.clone();
        let ticker = tick(self.config.liveness_poll_interval);

        loop {
            if self.abort.is_aborted() {
                warn!("Abort requested, terminating all workers");
                self.hard_terminate();
                return Ok(());
            }

            self.ensure_capacity()?;
            self.dispatch();

            if self.source_exhausted && self.scheduler.is_drained() {
                info!(
                    "All tasks processed: {} completed, {} abandoned",
                    self.scheduler.completed_count(),
                    self.scheduler.abandoned_count()
                );
                return Ok(());
            }

            // Pull from the source only when someone can take the work
            let pull = !self.source_exhausted
                && self.scheduler.pending_count() == 0
                && self.slots.iter().any(WorkerSlot::is_idle);
            let intake = if pull { intake.clone() } else { never() };

            select! {
                recv(inbox) -> event => {
                    if let Ok(event) = event {
                        self.handle_event(event);
                    }
                }
                recv(intake) -> item => match item {
                    Ok(Ok(path_spec)) => self.submit(path_spec),
                    Ok(Err(message)) => {
                        warn!("Source error: {}", message);
                        self.state.counters.produced_errors += 1;
                        self.publish_own_status();
                    }
                    Err(_) => {
                        info!("Source exhausted");
                        self.source_exhausted = true;
                    }
                },
                recv(ticker) -> _ => self.poll(),
            }
        }
    }

    fn submit(&mut self, path_spec: PathSpec) {
        let id = self.scheduler.submit(path_spec);
        debug!("Queued task {}", id);
        self.state.counters.produced_sources += 1;
        self.publish_own_status();
    }

    fn slot_index(&self, identifier: &str, generation: u32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.identifier == identifier && slot.generation() == Some(generation))
    }

    fn handle_event(&mut self, event: TransportEvent) {
        let index = match self.slot_index(&event.identifier, event.generation) {
            Some(index) if self.slots[index].link.is_some() => index,
            _ => {
                debug!(
                    "Discarding event of retired worker {} (generation {})",
                    event.identifier, event.generation
                );
                return;
            }
        };

        let now = Utc::now();
        if let Some(handle) = self.slots[index].handle.as_mut() {
            handle.touch(now);
        }

        match event.kind {
            TransportEventKind::Message(WorkerMessage::Started { pid }) => {
                if let Some(handle) = self.slots[index].handle.as_mut() {
                    handle.mark_running(pid, now);
                }
                self.spawn_failures = 0;
                debug!("Worker {} (PID {}) is running", event.identifier, pid);
            }
            TransportEventKind::Message(WorkerMessage::Status(snapshot)) => {
                self.apply_worker_snapshot(index, snapshot);
            }
            TransportEventKind::Message(WorkerMessage::SourceProduced { path_spec }) => {
                debug!("Worker {} produced {}", event.identifier, path_spec);
                self.slots[index].produced.push(path_spec);
            }
            TransportEventKind::Message(WorkerMessage::TaskCompleted { task_id, events, errors }) => {
                self.complete_task(index, task_id, events, errors);
            }
            TransportEventKind::Disconnected => self.on_disconnected(index),
        }
    }

    fn apply_worker_snapshot(&mut self, index: usize, mut snapshot: StatusSnapshot) {
        let slot = &mut self.slots[index];
        snapshot.identifier = slot.identifier.clone();
        snapshot.counters = slot.counter_base.combined(&snapshot.counters);

        match self.status.update_worker_status(&snapshot) {
            Ok(()) => slot.last_counters = snapshot.counters,
            Err(error) => {
                warn!("{}", error);
                self.record_incident(&snapshot.identifier, &error, None);
            }
        }
    }

    fn complete_task(&mut self, index: usize, task_id: TaskId, events: u64, errors: u64) {
        let slot = &mut self.slots[index];
        match slot.task.take() {
            Some(task) if task.id == task_id => {
                if let Some(handle) = slot.handle.as_mut() {
                    handle.clear_task();
                }
                let produced = std::mem::take(&mut slot.produced);
                self.scheduler.complete(task_id);
                for path_spec in produced {
                    self.submit(path_spec);
                }
                self.state.counters.consumed_events += events;
                self.state.counters.consumed_errors += errors;
                self.publish_own_status();
            }
            other => {
                warn!("Worker {} completed task {} it was not holding", slot.identifier, task_id);
                slot.task = other;
            }
        }
    }

    fn on_disconnected(&mut self, index: usize) {
        let reason = match self.slots[index].link.as_mut() {
            Some(link) => link.reap(),
            None => return,
        };
        // Nobody asked it to stop
        let reason = match reason {
            TerminationReason::Shutdown | TerminationReason::Aborted => TerminationReason::Crashed,
            other => other,
        };
        self.retire_worker(index, reason, None);
    }

    fn kill_worker(&mut self, index: usize, reason: TerminationReason, cause: Option<EngineError>) {
        if let Some(link) = self.slots[index].link.as_mut() {
            link.terminate();
            link.reap();
        }
        self.retire_worker(index, reason, cause);
    }

    /// Bookkeeping for a worker that is gone: status, incident, and the fate
    /// of the task it held. Respawning is left to `ensure_capacity`.
    ///
    /// `cause` replaces the error derived from `reason` in the incident.
    fn retire_worker(&mut self, index: usize, reason: TerminationReason, cause: Option<EngineError>) {
        let slot = &mut self.slots[index];
        if slot.link.take().is_none() {
            return;
        }
        // Sources of a task that did not complete come back with its retry
        let dropped = std::mem::take(&mut slot.produced);
        if !dropped.is_empty() {
            debug!("Dropping {} sources of {}'s unfinished task", dropped.len(), slot.identifier);
        }

        let reached_running = match slot.handle.as_mut() {
            Some(handle) => {
                let running = handle.is_running();
                handle.mark_terminated(reason);
                running
            }
            None => false,
        };
        let identifier = slot.identifier.clone();
        let pid = slot.pid();
        let task = slot.task.take();
        let killed = StatusSnapshot::new(&identifier, pid, STATUS_KILLED, "", slot.last_counters);

        if !reached_running {
            self.spawn_failures += 1;
        }
        if self.status.worker_status(&identifier).is_some() {
            if let Err(e) = self.status.update_worker_status(&killed) {
                debug!("{}", e);
            }
        }

        let error = match (cause, reason) {
            (Some(cause), _) => Some(cause),
            (None, TerminationReason::MemoryExceeded) => Some(EngineError::WorkerMemoryExceeded {
                identifier: identifier.clone(),
                pid,
            }),
            (None, TerminationReason::Crashed) => Some(EngineError::WorkerCrashed {
                identifier: identifier.clone(),
                pid,
            }),
            // Staleness is recorded by the poll that noticed it
            (None, TerminationReason::Timeout | TerminationReason::Shutdown | TerminationReason::Aborted) => None,
        };
        if let Some(error) = error {
            warn!("{}", error);
            let path_spec = task.as_ref().map(|task| task.path_spec.to_string());
            self.record_incident(&identifier, &error, path_spec.as_deref());
        }

        if let Some(task) = task {
            self.fail_task(task);
        }
    }

    fn fail_task(&mut self, task: Task) {
        match self.scheduler.fail(task.id) {
            Some(FailureOutcome::Requeued(_)) => {
                info!("Requeued {} after its worker was terminated", task.path_spec);
            }
            Some(FailureOutcome::Abandoned(task)) => {
                let error = EngineError::TaskAbandoned {
                    task_id: task.id,
                    path_spec: task.path_spec.to_string(),
                    attempts: task.retries + 1,
                };
                error!("{}", error);
                self.status.add_error_path_spec(task.path_spec.as_str());
                self.state.counters.produced_errors += 1;
                self.publish_own_status();
                self.record_incident(FOREMAN_IDENTIFIER, &error, Some(task.path_spec.as_str()));
            }
            None => debug!("Task {} was not in flight", task.id),
        }
    }

    /// Keep the pool full while there is work left
    fn ensure_capacity(&mut self) -> Result<()> {
        if self.shutting_down {
            return Ok(());
        }
        if self.source_exhausted && self.scheduler.pending_count() == 0 {
            return Ok(());
        }

        for index in 0..self.slots.len() {
            if self.slots[index].link.is_some() {
                continue;
            }
            if self.spawn_failures >= MAX_CONSECUTIVE_SPAWN_FAILURES {
                let detail = format!(
                    "{} workers in a row failed to start{}",
                    self.spawn_failures,
                    self.last_spawn_error
                        .as_ref()
                        .map(|e| format!(", last error: {}", e))
                        .unwrap_or_default()
                );
                return Err(EngineError::WorkerSpawn {
                    identifier: self.slots[index].identifier.clone(),
                    detail,
                }
                .into());
            }
            self.spawn_worker(index);
        }
        Ok(())
    }

    fn spawn_worker(&mut self, index: usize) {
        let memory_limit = if self.transport.isolates_workers() {
            self.config.effective_worker_memory_limit()
        } else {
            0
        };

        let slot = &mut self.slots[index];
        let generation = slot.spawned;
        slot.spawned += 1;
        let launch = WorkerLaunch {
            identifier: slot.identifier.clone(),
            generation,
            memory_limit,
            status_update_items: self.config.status_update_items,
            status_update_interval: self.config.status_update_interval,
        };

        match self.transport.spawn(&launch, self.events.clone()) {
            Ok(link) => {
                slot.handle = Some(WorkerHandle::new(
                    &slot.identifier,
                    link.pid(),
                    generation,
                    memory_limit,
                    Utc::now(),
                ));
                slot.counter_base = slot.last_counters;
                slot.link = Some(link);
                if generation > 0 {
                    info!("Respawned {} (generation {})", slot.identifier, generation);
                }
            }
            Err(e) => {
                error!("Unable to start {}: {:#}", launch.identifier, e);
                self.spawn_failures += 1;
                self.last_spawn_error = Some(format!("{:#}", e));
            }
        }
    }

    fn dispatch(&mut self) {
        for index in 0..self.slots.len() {
            if !self.slots[index].is_idle() {
                continue;
            }
            let task = match self.scheduler.next_task() {
                Some(task) => task,
                None => return,
            };

            let slot = &mut self.slots[index];
            let sent = match slot.link.as_mut() {
                Some(link) => link.send(&ForemanMessage::Task(task.clone())),
                None => continue,
            };
            match sent {
                Ok(()) => {
                    debug!("Assigned task {} ({}) to {}", task.id, task.path_spec, slot.identifier);
                    if let Some(handle) = slot.handle.as_mut() {
                        handle.assign_task(Utc::now());
                    }
                    slot.task = Some(task);
                }
                Err(e) => {
                    let error = EngineError::Transport(format!(
                        "unable to hand {} to {}: {:#}",
                        task.path_spec, slot.identifier, e
                    ));
                    self.scheduler.release(task.id);
                    self.kill_worker(index, TerminationReason::Crashed, Some(error));
                }
            }
        }
    }

    /// Liveness check, memory sampling and a view refresh.
    ///
    /// A worker that never reports in is killed like a stale one and counts
    /// as a failed start.
    fn poll(&mut self) {
        let now = Utc::now();
        let mut stale = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let handle = match (&slot.handle, &slot.link) {
                (Some(handle), Some(_)) => handle,
                _ => continue,
            };
            let last_running_time = self
                .status
                .worker_status(&slot.identifier)
                .and_then(|status| status.last_running_time);
            if let Some(idle) = self.liveness.check(handle, last_running_time, now) {
                stale.push((index, idle));
            }
        }

        for (index, idle) in stale {
            let identifier = self.slots[index].identifier.clone();
            let error = EngineError::WorkerStaleness {
                identifier: identifier.clone(),
                idle_seconds: idle.as_secs_f64(),
            };
            warn!("{}", error);
            let path_spec = self.slots[index]
                .task
                .as_ref()
                .map(|task| task.path_spec.to_string());
            self.record_incident(&identifier, &error, path_spec.as_deref());
            self.kill_worker(index, TerminationReason::Timeout, None);
        }

        self.sample_memory();
        self.view.refresh(&self.status);
    }

    fn sample_memory(&mut self) {
        if let Some(used) = self.sampler.sample(self.state.pid) {
            self.status.record_memory_usage(FOREMAN_IDENTIFIER, used);
        }
        if !self.transport.isolates_workers() {
            return;
        }
        for slot in &self.slots {
            if slot.link.is_none() {
                continue;
            }
            if let Some(used) = self.sampler.sample(slot.pid()) {
                self.status.record_memory_usage(&slot.identifier, used);
            }
        }
    }

    /// Drain: tell every worker to stop, wait for it, then apply the final
    /// snapshots still in the event channel.
    fn shutdown_workers(&mut self) {
        self.shutting_down = true;

        for slot in &mut self.slots {
            if let Some(link) = slot.link.as_mut() {
                if let Err(e) = link.send(&ForemanMessage::Shutdown) {
                    debug!("Shutdown of {} not delivered: {:#}", slot.identifier, e);
                }
            }
        }

        let mut stopped = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(mut link) = slot.link.take() {
                let reason = link.reap();
                debug!("{} stopped ({:?})", slot.identifier, reason);
                if let Some(handle) = slot.handle.as_mut() {
                    handle.mark_terminated(TerminationReason::Shutdown);
                }
                stopped.push(index);
            }
        }

        let remaining: Vec<TransportEvent> = self.inbox.try_iter().collect();
        for event in remaining {
            let index = match self.slot_index(&event.identifier, event.generation) {
                Some(index) if stopped.contains(&index) => index,
                _ => continue,
            };
            if let TransportEventKind::Message(WorkerMessage::Status(snapshot)) = event.kind {
                self.apply_worker_snapshot(index, snapshot);
            }
        }
        info!("All workers stopped");
    }

    /// Kill every worker immediately and mark the run aborted
    fn hard_terminate(&mut self) {
        self.shutting_down = true;

        for index in 0..self.slots.len() {
            let slot = &mut self.slots[index];
            let mut link = match slot.link.take() {
                Some(link) => link,
                None => continue,
            };
            link.terminate();
            link.reap();

            if let Some(handle) = slot.handle.as_mut() {
                handle.mark_terminated(TerminationReason::Aborted);
            }
            slot.task = None;
            slot.produced.clear();
            let aborted = StatusSnapshot::new(&slot.identifier, slot.pid(), STATUS_ABORTED, "", slot.last_counters);
            if self.status.worker_status(&slot.identifier).is_some() {
                if let Err(e) = self.status.update_worker_status(&aborted) {
                    debug!("{}", e);
                }
            }
        }
        self.status.mark_aborted();
    }

    fn publish_own_status(&mut self) {
        if let Err(e) = self.status.update_foreman_status(&self.state.snapshot()) {
            warn!("{}", e);
        }
    }

    fn record_incident(&mut self, identifier: &str, error: &EngineError, path_spec: Option<&str>) {
        if let Some(incident) = Incident::from_error(identifier, error, path_spec) {
            self.incidents.push(incident);
        }
    }
}
