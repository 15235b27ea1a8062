use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::{unbounded, Receiver, Sender};
use log::{debug, error};

use crate::extractors::{SinkFactory, TaskProcessor};
use crate::governor::TerminationReason;
use crate::transport::{
    ForemanMessage, TransportEvent, WorkerLaunch, WorkerLink, WorkerMessage, WorkerTransport,
};
use crate::worker::{run_worker, WorkerEndpoint, WorkerSettings};

/// Workers as threads of the foreman process.
///
/// A terminated worker thread cannot be killed; it is detached and whatever
/// it still sends carries a stale generation.
pub struct LocalTransport {
    processor: Arc<dyn TaskProcessor>,
    sinks: Arc<dyn SinkFactory>,
}

impl LocalTransport {
    pub fn new(processor: Arc<dyn TaskProcessor>, sinks: Arc<dyn SinkFactory>) -> Self {
        Self { processor, sinks }
    }
}

impl WorkerTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local-queue"
    }

    fn isolates_workers(&self) -> bool {
        false
    }

    fn spawn(&self, launch: &WorkerLaunch, events: Sender<TransportEvent>) -> Result<Box<dyn WorkerLink>> {
        let (sender, inbox) = unbounded();
        let endpoint = ChannelEndpoint {
            identifier: launch.identifier.clone(),
            generation: launch.generation,
            inbox,
            events,
        };
        let settings = WorkerSettings {
            identifier: launch.identifier.clone(),
            pid: std::process::id(),
            status_update_items: launch.status_update_items,
            status_update_interval: launch.status_update_interval,
        };
        let processor = Arc::clone(&self.processor);
        let sinks = Arc::clone(&self.sinks);

        let thread = thread::Builder::new()
            .name(launch.identifier.clone())
            .spawn(move || {
                let sink = match sinks.open(&settings.identifier) {
                    Ok(sink) => sink,
                    Err(e) => {
                        error!("Worker {} cannot open its sink: {:#}", settings.identifier, e);
                        return;
                    }
                };
                if let Err(e) = run_worker(endpoint, &settings, processor.as_ref(), sink) {
                    error!("Worker {} failed: {:#}", settings.identifier, e);
                }
            })
            .context(format!("Failed to start worker thread {}", launch.identifier))?;

        debug!("Started worker thread {} (generation {})", launch.identifier, launch.generation);
        Ok(Box::new(ThreadLink {
            sender: Some(sender),
            thread: Some(thread),
        }))
    }
}

/// Worker side of a local worker. Dropping it, on return or on unwind,
/// tells the foreman the worker is gone.
struct ChannelEndpoint {
    identifier: String,
    generation: u32,
    inbox: Receiver<ForemanMessage>,
    events: Sender<TransportEvent>,
}

impl WorkerEndpoint for ChannelEndpoint {
    fn receive(&mut self) -> Result<Option<ForemanMessage>> {
        Ok(self.inbox.recv().ok())
    }

    fn send(&mut self, message: WorkerMessage) -> Result<()> {
        self.events
            .send(TransportEvent::message(&self.identifier, self.generation, message))
            .map_err(|_| anyhow!("Foreman event channel closed"))
    }
}

impl Drop for ChannelEndpoint {
    fn drop(&mut self) {
        let _ = self
            .events
            .send(TransportEvent::disconnected(&self.identifier, self.generation));
    }
}

struct ThreadLink {
    sender: Option<Sender<ForemanMessage>>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerLink for ThreadLink {
    fn pid(&self) -> u32 {
        std::process::id()
    }

    fn send(&mut self, message: &ForemanMessage) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("Worker was terminated"))?;
        sender
            .send(message.clone())
            .map_err(|_| anyhow!("Worker channel closed"))
    }

    fn terminate(&mut self) {
        // Closing the inbox ends the worker at its next receive
        self.sender = None;
        if let Some(thread) = self.thread.take() {
            debug!("Detaching worker thread {:?}", thread.thread().name());
        }
    }

    fn reap(&mut self) -> TerminationReason {
        self.sender = None;
        match self.thread.take() {
            Some(thread) => match thread.join() {
                Ok(()) => TerminationReason::Shutdown,
                Err(_) => TerminationReason::Crashed,
            },
            None => TerminationReason::Aborted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Task;
    use crate::extractors::MemorySinkFactory;
    use crate::models::PathSpec;
    use crate::test_utils::ScriptedProcessor;
    use crate::transport::TransportEventKind;
    use std::time::Duration;

    fn launch(identifier: &str) -> WorkerLaunch {
        WorkerLaunch {
            identifier: identifier.to_string(),
            generation: 2,
            memory_limit: 0,
            status_update_items: 100,
            status_update_interval: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_local_worker_roundtrip() {
        let sinks = MemorySinkFactory::new();
        let transport = LocalTransport::new(Arc::new(ScriptedProcessor::default()), Arc::new(sinks.clone()));
        let (events, receiver) = unbounded();

        let mut link = transport.spawn(&launch("worker-00"), events).unwrap();
        link.send(&ForemanMessage::Task(Task::new(1, PathSpec::from("/a")))).unwrap();
        link.send(&ForemanMessage::Shutdown).unwrap();
        assert_eq!(link.reap(), TerminationReason::Shutdown);

        let received: Vec<TransportEvent> = receiver.try_iter().collect();
        assert!(received.iter().all(|event| event.generation == 2));
        assert_eq!(
            received.first().map(|event| &event.kind),
            Some(&TransportEventKind::Message(WorkerMessage::Started { pid: std::process::id() }))
        );
        assert!(received.iter().any(|event| event.kind
            == TransportEventKind::Message(WorkerMessage::TaskCompleted { task_id: 1, events: 2, errors: 0 })));
        assert_eq!(received.last().map(|event| &event.kind), Some(&TransportEventKind::Disconnected));
        assert_eq!(sinks.records().events.len(), 2);
    }

    #[test]
    fn test_panicking_worker_reports_disconnect() {
        let processor = ScriptedProcessor::default().panicking_on("/poison");
        let transport = LocalTransport::new(Arc::new(processor), Arc::new(MemorySinkFactory::new()));
        let (events, receiver) = unbounded();

        let mut link = transport.spawn(&launch("worker-01"), events).unwrap();
        link.send(&ForemanMessage::Task(Task::new(9, PathSpec::from("/poison")))).unwrap();

        let disconnected = receiver
            .iter()
            .find(|event| event.kind == TransportEventKind::Disconnected);
        assert!(disconnected.is_some());
        assert_eq!(link.reap(), TerminationReason::Crashed);
    }

    #[test]
    fn test_terminated_link_rejects_messages() {
        let transport = LocalTransport::new(
            Arc::new(ScriptedProcessor::default()),
            Arc::new(MemorySinkFactory::new()),
        );
        let (events, _receiver) = unbounded();

        let mut link = transport.spawn(&launch("worker-02"), events).unwrap();
        link.terminate();
        assert!(link.send(&ForemanMessage::Shutdown).is_err());
        assert_eq!(link.reap(), TerminationReason::Aborted);
    }
}
