use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;

use crate::constants::EVENT_FILE_EXTENSION;
use crate::extractors::{EventSink, SinkFactory};
use crate::models::{ExtractionWarning, TimelineEvent};

#[derive(Serialize)]
#[serde(tag = "record_type", rename_all = "snake_case")]
enum SinkRecord<'a> {
    Event(&'a TimelineEvent),
    Warning(&'a ExtractionWarning),
}

/// Writes `<output_dir>/<identifier>.jsonl`, one JSON record per line.
#[derive(Debug, Clone)]
pub struct JsonLinesSinkFactory {
    output_dir: PathBuf,
}

impl JsonLinesSinkFactory {
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .context(format!("Failed to create output directory {}", output_dir.display()))?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", identifier, EVENT_FILE_EXTENSION))
    }
}

impl SinkFactory for JsonLinesSinkFactory {
    fn open(&self, identifier: &str) -> Result<Box<dyn EventSink>> {
        let path = self.path_for(identifier);
        // Respawned workers append to the file of their slot
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context(format!("Failed to open event file {}", path.display()))?;

        debug!("Writing events of {} to {}", identifier, path.display());
        Ok(Box::new(JsonLinesSink {
            writer: BufWriter::new(file),
        }))
    }
}

struct JsonLinesSink {
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    fn write_record(&mut self, record: &SinkRecord<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record).context("Failed to serialize record")?;
        self.writer
            .write_all(b"\n")
            .context("Failed to write record")?;
        Ok(())
    }
}

impl EventSink for JsonLinesSink {
    fn write_event(&mut self, event: &TimelineEvent) -> Result<()> {
        self.write_record(&SinkRecord::Event(event))
    }

    fn write_warning(&mut self, warning: &ExtractionWarning) -> Result<()> {
        self.write_record(&SinkRecord::Warning(warning))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush event file")
    }
}

/// Everything written to a [`MemorySinkFactory`], across all processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    pub events: Vec<TimelineEvent>,
    pub warnings: Vec<ExtractionWarning>,
}

/// Keeps records in memory; only meaningful for workers that share the
/// foreman's address space.
#[derive(Debug, Clone, Default)]
pub struct MemorySinkFactory {
    records: Arc<Mutex<MemoryRecords>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> MemoryRecords {
        lock(&self.records).clone()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, _identifier: &str) -> Result<Box<dyn EventSink>> {
        Ok(Box::new(MemorySink {
            records: Arc::clone(&self.records),
        }))
    }
}

struct MemorySink {
    records: Arc<Mutex<MemoryRecords>>,
}

impl EventSink for MemorySink {
    fn write_event(&mut self, event: &TimelineEvent) -> Result<()> {
        lock(&self.records).events.push(event.clone());
        Ok(())
    }

    fn write_warning(&mut self, warning: &ExtractionWarning) -> Result<()> {
        lock(&self.records).warnings.push(warning.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// A worker thread that panicked while holding the lock leaves whole records
fn lock(records: &Mutex<MemoryRecords>) -> MutexGuard<'_, MemoryRecords> {
    records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PathSpec;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn event(path: &str) -> TimelineEvent {
        TimelineEvent {
            timestamp: Utc::now(),
            timestamp_desc: "Content Modification Time".to_string(),
            data_type: "fs:stat".to_string(),
            path_spec: PathSpec::from(path),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_json_lines_sink_writes_tagged_records() {
        let temp_dir = TempDir::new().unwrap();
        let factory = JsonLinesSinkFactory::new(&temp_dir.path().join("out")).unwrap();

        let mut sink = factory.open("worker-00").unwrap();
        sink.write_event(&event("/a")).unwrap();
        sink.write_warning(&ExtractionWarning::new(PathSpec::from("/b"), "filestat", "unreadable"))
            .unwrap();
        sink.flush().unwrap();

        let content = fs::read_to_string(factory.path_for("worker-00")).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["record_type"], "event");
        assert_eq!(lines[0]["path_spec"], "/a");
        assert_eq!(lines[1]["record_type"], "warning");
        assert_eq!(lines[1]["message"], "unreadable");
    }

    #[test]
    fn test_reopened_sink_appends() {
        let temp_dir = TempDir::new().unwrap();
        let factory = JsonLinesSinkFactory::new(temp_dir.path()).unwrap();

        for path in ["/first", "/second"] {
            let mut sink = factory.open("worker-01").unwrap();
            sink.write_event(&event(path)).unwrap();
            sink.flush().unwrap();
        }

        let content = fs::read_to_string(factory.path_for("worker-01")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_memory_sink_shares_records() {
        let factory = MemorySinkFactory::new();
        let mut first = factory.open("worker-00").unwrap();
        let mut second = factory.open("worker-01").unwrap();

        first.write_event(&event("/a")).unwrap();
        second.write_event(&event("/b")).unwrap();

        assert_eq!(factory.records().events.len(), 2);
        assert!(factory.records().warnings.is_empty());
    }
}
