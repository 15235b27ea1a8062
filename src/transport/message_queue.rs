use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use crossbeam::channel::Sender;
use log::{debug, warn};

use crate::governor::{classify_exit, TerminationReason};
use crate::transport::{
    ForemanMessage, TransportEvent, WorkerCommand, WorkerLaunch, WorkerLink, WorkerMessage,
    WorkerTransport,
};

/// Workers as child processes of the foreman.
///
/// Each child is `program worker --identifier .. <launch args> <extra args>`.
/// Its stdin carries [`ForemanMessage`]s and its stdout [`WorkerMessage`]s,
/// one JSON document per line; stderr is inherited for logging.
pub struct MessageQueueTransport {
    command: WorkerCommand,
}

impl MessageQueueTransport {
    pub fn new(command: WorkerCommand) -> Self {
        Self { command }
    }
}

impl WorkerTransport for MessageQueueTransport {
    fn name(&self) -> &'static str {
        "message-queue"
    }

    fn isolates_workers(&self) -> bool {
        true
    }

    fn spawn(&self, launch: &WorkerLaunch, events: Sender<TransportEvent>) -> Result<Box<dyn WorkerLink>> {
        let mut child = Command::new(&self.command.program)
            .arg("worker")
            .arg("--identifier")
            .arg(&launch.identifier)
            .arg("--memory-limit")
            .arg(launch.memory_limit.to_string())
            .arg("--status-update-items")
            .arg(launch.status_update_items.to_string())
            .arg("--status-update-interval")
            .arg(launch.status_update_interval.as_secs_f64().to_string())
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context(format!(
                "Failed to start worker process {} from {}",
                launch.identifier,
                self.command.program.display()
            ))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Worker {} has no stdout", launch.identifier))?;

        let identifier = launch.identifier.clone();
        let generation = launch.generation;
        let reader = thread::Builder::new()
            .name(format!("{}-reader", launch.identifier))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            debug!("Reading from {} failed: {}", identifier, e);
                            break;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<WorkerMessage>(&line) {
                        Ok(message) => {
                            if events
                                .send(TransportEvent::message(&identifier, generation, message))
                                .is_err()
                            {
                                break;
                            }
                        }
                        Err(e) => warn!("Discarding malformed message from {}: {}", identifier, e),
                    }
                }
                let _ = events.send(TransportEvent::disconnected(&identifier, generation));
            });

        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e).context("Failed to start worker reader thread");
            }
        };

        debug!(
            "Started worker process {} (PID {}, generation {})",
            launch.identifier, pid, launch.generation
        );
        Ok(Box::new(ProcessLink {
            child,
            stdin,
            reader: Some(reader),
            pid,
        }))
    }
}

struct ProcessLink {
    child: Child,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    pid: u32,
}

impl ProcessLink {
    fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("Reader thread of PID {} panicked", self.pid);
            }
        }
    }
}

impl WorkerLink for ProcessLink {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn send(&mut self, message: &ForemanMessage) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("Worker PID {} was terminated", self.pid))?;
        let mut line = serde_json::to_string(message).context("Failed to serialize message")?;
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush())
            .context(format!("Failed to write to worker PID {}", self.pid))
    }

    fn terminate(&mut self) {
        self.stdin = None;
        if let Err(e) = self.child.kill() {
            debug!("Kill of PID {} failed: {}", self.pid, e);
        }
    }

    fn reap(&mut self) -> TerminationReason {
        self.stdin = None;
        let reason = match self.child.wait() {
            Ok(status) => {
                debug!("Worker PID {} exited with {}", self.pid, status);
                classify_exit(&status)
            }
            Err(e) => {
                warn!("Failed to wait for worker PID {}: {}", self.pid, e);
                TerminationReason::Crashed
            }
        };
        self.join_reader();
        reason
    }
}

impl Drop for ProcessLink {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
