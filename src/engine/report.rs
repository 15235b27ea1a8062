use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use uuid::Uuid;

use crate::error::EngineError;
use crate::status::{ProcessingStatus, StatusTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    Staleness,
    MemoryExceeded,
    Crashed,
    CounterRegression,
    TaskAbandoned,
}

/// A per-process fault the foreman recovered from.
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub identifier: String,
    pub kind: IncidentKind,
    pub path_spec: Option<String>,
    pub message: String,
    pub time: DateTime<Utc>,
}

impl Incident {
    /// Incident for a recoverable engine error; `None` for errors that end
    /// the run instead.
    pub fn from_error(identifier: &str, error: &EngineError, path_spec: Option<&str>) -> Option<Self> {
        let kind = match error {
            EngineError::WorkerStaleness { .. } => IncidentKind::Staleness,
            EngineError::WorkerMemoryExceeded { .. } => IncidentKind::MemoryExceeded,
            EngineError::WorkerCrashed { .. } | EngineError::Transport(_) => IncidentKind::Crashed,
            EngineError::CounterRegression { .. } => IncidentKind::CounterRegression,
            EngineError::TaskAbandoned { .. } => IncidentKind::TaskAbandoned,
            EngineError::Configuration(_) | EngineError::WorkerSpawn { .. } => return None,
        };

        Some(Self {
            identifier: identifier.to_string(),
            kind,
            path_spec: path_spec.map(str::to_string),
            message: error.to_string(),
            time: Utc::now(),
        })
    }
}

/// What a finished run hands back to the engine
pub(crate) struct RunOutcome {
    pub status: ProcessingStatus,
    pub incidents: Vec<Incident>,
    pub completed_tasks: u64,
    pub abandoned_tasks: u64,
}

impl RunOutcome {
    pub(crate) fn into_report(self, mode: &str, started: DateTime<Utc>) -> ProcessingReport {
        ProcessingReport::new(
            mode,
            started,
            self.status,
            self.incidents,
            self.completed_tasks,
            self.abandoned_tasks,
        )
    }
}

/// Final read model of one extraction run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub session_id: String,
    pub hostname: String,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    /// `single-process`, `message-queue` or `local-queue`
    pub mode: String,
    pub completed_tasks: u64,
    pub abandoned_tasks: u64,
    pub totals: StatusTotals,
    pub status: ProcessingStatus,
    pub incidents: Vec<Incident>,
}

impl ProcessingReport {
    pub fn new(
        mode: &str,
        started: DateTime<Utc>,
        status: ProcessingStatus,
        incidents: Vec<Incident>,
        completed_tasks: u64,
        abandoned_tasks: u64,
    ) -> Self {
        let hostname = hostname::get()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            session_id: Uuid::new_v4().to_string(),
            hostname,
            started,
            finished: Utc::now(),
            mode: mode.to_string(),
            completed_tasks,
            abandoned_tasks,
            totals: status.totals(),
            status,
            incidents,
        }
    }

    /// Not aborted and no task abandoned
    pub fn is_complete(&self) -> bool {
        !self.status.aborted && self.abandoned_tasks == 0
    }

    pub fn incident_count(&self, kind: IncidentKind) -> usize {
        self.incidents.iter().filter(|incident| incident.kind == kind).count()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| anyhow!("Failed to serialize report: {}", e))
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, self.to_json()?)
            .context(format!("Failed to write report to {}", path.display()))?;

        info!("Wrote extraction report to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot;
    use tempfile::TempDir;

    fn sample_status() -> ProcessingStatus {
        let mut status = ProcessingStatus::new();
        status.start_foreman("foreman", 1);
        status
            .update_worker_status(&snapshot("worker-00", "Completed", 2, "", [3, 0, 0, 6, 0, 0]))
            .unwrap();
        status
    }

    #[test]
    fn test_incident_kinds() {
        let staleness = EngineError::WorkerStaleness {
            identifier: "worker-00".to_string(),
            idle_seconds: 901.0,
        };
        let incident = Incident::from_error("worker-00", &staleness, Some("/slow")).unwrap();
        assert_eq!(incident.kind, IncidentKind::Staleness);
        assert_eq!(incident.path_spec.as_deref(), Some("/slow"));
        assert!(incident.message.contains("901.0"));

        let configuration = EngineError::Configuration("workers".to_string());
        assert!(Incident::from_error("foreman", &configuration, None).is_none());
    }

    #[test]
    fn test_report_completeness() {
        let report = ProcessingReport::new("local-queue", Utc::now(), sample_status(), Vec::new(), 3, 0);
        assert!(report.is_complete());
        assert_eq!(report.totals.counters.consumed_sources, 3);

        let mut status = sample_status();
        status.add_error_path_spec("/poison");
        let report = ProcessingReport::new("local-queue", Utc::now(), status, Vec::new(), 3, 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_report_json_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("reports").join("run.json");
        let report = ProcessingReport::new("message-queue", Utc::now(), sample_status(), Vec::new(), 3, 0);

        report.write_to_file(&path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(json["mode"], "message-queue");
        assert_eq!(json["completed_tasks"], 3);
        assert_eq!(json["totals"]["produced_events"], 6);
        assert_eq!(json["status"]["workers_status"]["worker-00"]["consumed_sources"], 3);
        assert_eq!(json["status"]["foreman_status"]["identifier"], "foreman");
        assert!(Uuid::parse_str(json["session_id"].as_str().unwrap()).is_ok());
    }
}
