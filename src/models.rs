use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

/// Opaque locator of one unit of work.
///
/// The engine never looks inside a path specification; only the source that
/// produced it and the processor that consumes it give it meaning.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PathSpec(String);

impl PathSpec {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Build a path specification for a file on the local file system
    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PathSpec {
    fn from(location: &str) -> Self {
        Self::new(location)
    }
}

impl From<String> for PathSpec {
    fn from(location: String) -> Self {
        Self(location)
    }
}

/// A single timeline record produced while processing a path specification.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub timestamp: DateTime<Utc>,
    pub timestamp_desc: String,
    pub data_type: String,
    pub path_spec: PathSpec,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// A recoverable problem met while processing a path specification.
///
/// Warnings count as produced errors in the status model; they never fail
/// the task that raised them.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ExtractionWarning {
    pub path_spec: PathSpec,
    pub parser: String,
    pub message: String,
}

impl ExtractionWarning {
    pub fn new(path_spec: PathSpec, parser: &str, message: impl Into<String>) -> Self {
        Self {
            path_spec,
            parser: parser.to_string(),
            message: message.into(),
        }
    }
}
