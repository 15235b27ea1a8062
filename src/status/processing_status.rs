use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::status::process_status::{ProcessStatus, StatusSnapshot};
use crate::status::totals::StatusTotals;

/// Aggregate status of an extraction run.
///
/// Owned by the foreman, which is its only writer. Workers never touch it;
/// they publish [`StatusSnapshot`]s that the foreman applies here.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStatus {
    foreman_status: Option<ProcessStatus>,
    workers_status: BTreeMap<String, ProcessStatus>,
    pub aborted: bool,
    pub error_path_specs: Vec<String>,
}

impl ProcessingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the foreman entry eagerly, before any update arrives
    pub fn start_foreman(&mut self, identifier: &str, pid: u32) {
        let mut status = ProcessStatus::new(identifier);
        status.pid = pid;
        self.foreman_status = Some(status);
    }

    pub fn update_foreman_status(&mut self, snapshot: &StatusSnapshot) -> Result<(), EngineError> {
        self.update_foreman_status_at(snapshot, Utc::now())
    }

    pub fn update_foreman_status_at(
        &mut self,
        snapshot: &StatusSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let status = self
            .foreman_status
            .get_or_insert_with(|| ProcessStatus::new(&snapshot.identifier));
        Self::update_process_status(status, snapshot, now)
    }

    pub fn update_worker_status(&mut self, snapshot: &StatusSnapshot) -> Result<(), EngineError> {
        self.update_worker_status_at(snapshot, Utc::now())
    }

    pub fn update_worker_status_at(
        &mut self,
        snapshot: &StatusSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let status = self
            .workers_status
            .entry(snapshot.identifier.clone())
            .or_insert_with(|| ProcessStatus::new(&snapshot.identifier));
        Self::update_process_status(status, snapshot, now)
    }

    fn update_process_status(
        status: &mut ProcessStatus,
        snapshot: &StatusSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        status.apply(snapshot, now)
    }

    pub fn foreman_status(&self) -> Option<&ProcessStatus> {
        self.foreman_status.as_ref()
    }

    /// Worker statuses ordered by identifier
    pub fn workers_status(&self) -> Vec<&ProcessStatus> {
        self.workers_status.values().collect()
    }

    pub fn worker_status(&self, identifier: &str) -> Option<&ProcessStatus> {
        self.workers_status.get(identifier)
    }

    /// Foreman first, then workers by identifier
    pub fn processes(&self) -> impl Iterator<Item = &ProcessStatus> {
        self.foreman_status.iter().chain(self.workers_status.values())
    }

    /// Record a memory sample; unknown identifiers are ignored
    pub fn record_memory_usage(&mut self, identifier: &str, used_memory: u64) {
        let status = match &mut self.foreman_status {
            Some(foreman) if foreman.identifier == identifier => Some(foreman),
            _ => self.workers_status.get_mut(identifier),
        };
        if let Some(status) = status {
            status.used_memory = Some(used_memory);
        }
    }

    pub fn add_error_path_spec(&mut self, path_spec: &str) {
        self.error_path_specs.push(path_spec.to_string());
    }

    pub fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    /// Run-wide totals over the foreman and all workers
    pub fn totals(&self) -> StatusTotals {
        StatusTotals::compute(self)
    }

    /// Whether any process moved a counter in its last update
    pub fn has_changed(&self) -> bool {
        self.processes().any(ProcessStatus::has_changed)
    }
}
