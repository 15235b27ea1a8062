//! Test utilities for rust-extractor
//!
//! Builders for status snapshots and events, plus scripted stand-ins for
//! the worker endpoint and the task processor.

#![cfg(test)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};

use crate::extractors::TaskProcessor;
use crate::models::{PathSpec, TimelineEvent};
use crate::status::{ProcessCounters, StatusSnapshot};
use crate::transport::{ForemanMessage, WorkerMessage};
use crate::worker::{ExtractionContext, StatusPublisher, WorkerEndpoint};

/// Snapshot with counters given in field order: consumed_sources,
/// produced_sources, consumed_events, produced_events, consumed_errors,
/// produced_errors
pub fn snapshot(identifier: &str, status: &str, pid: u32, display_name: &str, counters: [u64; 6]) -> StatusSnapshot {
    let [cs, ps, ce, pe, cr, pr] = counters;
    StatusSnapshot::new(
        identifier,
        pid,
        status,
        display_name,
        ProcessCounters::new(cs, ps, ce, pe, cr, pr),
    )
}

pub fn timeline_event(path: &str) -> TimelineEvent {
    TimelineEvent {
        timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        timestamp_desc: "Content Modification Time".to_string(),
        data_type: "test:event".to_string(),
        path_spec: PathSpec::from(path),
        attributes: BTreeMap::new(),
    }
}

/// Keeps every published snapshot
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub snapshots: Vec<StatusSnapshot>,
}

impl StatusPublisher for RecordingPublisher {
    fn publish(&mut self, snapshot: StatusSnapshot) -> Result<()> {
        self.snapshots.push(snapshot);
        Ok(())
    }
}

/// Worker endpoint that replays a fixed list of foreman messages, then
/// behaves as if the foreman went away.
pub struct ScriptedEndpoint {
    incoming: VecDeque<ForemanMessage>,
    sent: Arc<Mutex<Vec<WorkerMessage>>>,
}

impl ScriptedEndpoint {
    pub fn new(incoming: Vec<ForemanMessage>) -> Self {
        Self {
            incoming: incoming.into(),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn sent(&self) -> Arc<Mutex<Vec<WorkerMessage>>> {
        Arc::clone(&self.sent)
    }
}

impl WorkerEndpoint for ScriptedEndpoint {
    fn receive(&mut self) -> Result<Option<ForemanMessage>> {
        Ok(self.incoming.pop_front())
    }

    fn send(&mut self, message: WorkerMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("sent messages poisoned"))?
            .push(message);
        Ok(())
    }
}

/// Processor producing two events per path specification.
///
/// Every path specification that is not itself one of `sources` hands all
/// of `sources` back to the foreman.
#[derive(Debug, Clone, Default)]
pub struct ScriptedProcessor {
    sources: Vec<String>,
    failing: Option<String>,
    panicking: Option<String>,
}

impl ScriptedProcessor {
    pub fn with_sources(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_on(mut self, path: &str) -> Self {
        self.failing = Some(path.to_string());
        self
    }

    pub fn panicking_on(mut self, path: &str) -> Self {
        self.panicking = Some(path.to_string());
        self
    }
}

impl TaskProcessor for ScriptedProcessor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn process(&self, path_spec: &PathSpec, context: &mut ExtractionContext<'_>) -> Result<()> {
        let path = path_spec.as_str();
        if self.panicking.as_deref() == Some(path) {
            panic!("scripted panic on {}", path);
        }
        if self.failing.as_deref() == Some(path) {
            return Err(anyhow!("scripted failure on {}", path));
        }

        for _ in 0..2 {
            context.produce_event(timeline_event(path))?;
        }
        if !self.sources.iter().any(|source| source == path) {
            for source in &self.sources {
                context.produce_source(PathSpec::from(source.as_str()));
            }
        }
        Ok(())
    }
}
