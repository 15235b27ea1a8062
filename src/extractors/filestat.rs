use std::collections::BTreeMap;
use std::fs::Metadata;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;

use crate::constants::{STATUS_EXTRACTING, STATUS_HASHING};
use crate::extractors::TaskProcessor;
use crate::models::{ExtractionWarning, PathSpec, TimelineEvent};
use crate::utils::hash::sha256_file;
use crate::worker::ExtractionContext;

const DATA_TYPE: &str = "fs:stat";

/// Reference processor: one timeline event per file-system timestamp, with
/// the size and, for files up to `hash_max_size_mb`, the SHA-256 attached.
#[derive(Debug, Clone)]
pub struct FileStatProcessor {
    hash_max_size_mb: u64,
}

impl FileStatProcessor {
    /// A `hash_max_size_mb` of 0 disables hashing.
    pub fn new(hash_max_size_mb: u64) -> Self {
        Self { hash_max_size_mb }
    }

    fn hash(&self, path: &Path, path_spec: &PathSpec, context: &mut ExtractionContext<'_>) -> Result<Option<String>> {
        context.set_status(STATUS_HASHING);
        let result = sha256_file(path, self.hash_max_size_mb.saturating_mul(1024 * 1024));
        context.set_status(STATUS_EXTRACTING);

        match result {
            Ok(Some(hash)) => Ok(Some(hash)),
            Ok(None) => {
                debug!("Skipping hash of {}: larger than {}MB", path_spec, self.hash_max_size_mb);
                Ok(None)
            }
            Err(e) => {
                context.produce_warning(ExtractionWarning::new(
                    path_spec.clone(),
                    self.name(),
                    format!("Unable to hash: {}", e),
                ))?;
                Ok(None)
            }
        }
    }
}

fn timestamps(metadata: &Metadata) -> Vec<(&'static str, io::Result<SystemTime>)> {
    vec![
        ("Content Modification Time", metadata.modified()),
        ("Last Access Time", metadata.accessed()),
        ("Creation Time", metadata.created()),
    ]
}

impl TaskProcessor for FileStatProcessor {
    fn name(&self) -> &str {
        "filestat"
    }

    fn process(&self, path_spec: &PathSpec, context: &mut ExtractionContext<'_>) -> Result<()> {
        let path = Path::new(path_spec.as_str());
        let metadata = path
            .symlink_metadata()
            .context(format!("Failed to read metadata of {}", path.display()))?;

        let mut attributes = BTreeMap::new();
        attributes.insert("size".to_string(), metadata.len().to_string());
        if metadata.file_type().is_symlink() {
            attributes.insert("file_type".to_string(), "symlink".to_string());
        }

        if self.hash_max_size_mb > 0 && metadata.is_file() {
            if let Some(hash) = self.hash(path, path_spec, context)? {
                attributes.insert("sha256".to_string(), hash);
            }
        }

        for (timestamp_desc, time) in timestamps(&metadata) {
            // Not every file system records every timestamp
            let time = match time {
                Ok(time) => time,
                Err(_) => continue,
            };
            context.produce_event(TimelineEvent {
                timestamp: DateTime::<Utc>::from(time),
                timestamp_desc: timestamp_desc.to_string(),
                data_type: DATA_TYPE.to_string(),
                path_spec: path_spec.clone(),
                attributes: attributes.clone(),
            })?;
        }

        Ok(())
    }
}
