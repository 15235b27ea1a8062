use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_HASH_MAX_SIZE_MB, DEFAULT_LIVENESS_POLL_INTERVAL_SECS, DEFAULT_PROCESS_MEMORY_LIMIT,
    DEFAULT_QUEUE_DEPTH, DEFAULT_STATUS_UPDATE_INTERVAL_SECS, DEFAULT_STATUS_UPDATE_ITEMS,
    DEFAULT_WORKER_MEMORY_LIMIT, DEFAULT_WORKER_TIMEOUT_MINUTES,
};
use crate::error::EngineError;

/// How tasks travel between the foreman and its workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Worker processes exchanging JSON lines over stdio
    MessageQueue,
    /// Worker threads inside the foreman process
    LocalQueue,
}

impl TransportKind {
    pub fn name(&self) -> &'static str {
        match self {
            TransportKind::MessageQueue => "message-queue",
            TransportKind::LocalQueue => "local-queue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StatusViewMode {
    Linear,
    Window,
    None,
}

impl StatusViewMode {
    /// Linear on Windows, where redrawing the console is unreliable
    pub fn platform_default() -> Self {
        if cfg!(windows) {
            StatusViewMode::Linear
        } else {
            StatusViewMode::Window
        }
    }
}

/// Raw processing options as read from YAML or the command line.
///
/// Every field is optional so that a configuration file and the command
/// line can each override a subset. Numeric fields are signed so that
/// out-of-range input survives parsing and is rejected by [`resolve`].
///
/// [`resolve`]: ProcessingOptions::resolve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_memory_limit: Option<i64>,
    /// Minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_timeout: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_memory_limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_process: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_view: Option<StatusViewMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_update_items: Option<i64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_update_interval: Option<f64>,
    /// Seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness_poll_interval: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_max_size_mb: Option<i64>,
}

impl ProcessingOptions {
    /// Options with every field set to its documented default
    pub fn with_defaults() -> Self {
        Self {
            workers: Some(0),
            worker_memory_limit: Some(DEFAULT_WORKER_MEMORY_LIMIT as i64),
            worker_timeout: Some(DEFAULT_WORKER_TIMEOUT_MINUTES),
            process_memory_limit: Some(DEFAULT_PROCESS_MEMORY_LIMIT as i64),
            transport: Some(TransportKind::MessageQueue),
            single_process: Some(false),
            status_view: Some(StatusViewMode::platform_default()),
            queue_depth: Some(DEFAULT_QUEUE_DEPTH as i64),
            status_update_items: Some(DEFAULT_STATUS_UPDATE_ITEMS as i64),
            status_update_interval: Some(DEFAULT_STATUS_UPDATE_INTERVAL_SECS),
            liveness_poll_interval: Some(DEFAULT_LIVENESS_POLL_INTERVAL_SECS),
            hash_max_size_mb: Some(DEFAULT_HASH_MAX_SIZE_MB as i64),
        }
    }

    /// Load options from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let options: ProcessingOptions = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;

        debug!("Loaded processing options from {}", path.display());
        Ok(options)
    }

    /// Save options to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize options to YAML")?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved processing options to {}", path.display());
        Ok(())
    }

    /// Load options from `path` when given, otherwise start empty
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_yaml_file(path),
            None => {
                debug!("No config file given, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Override every field that is set in `overrides`
    pub fn merge(&mut self, overrides: ProcessingOptions) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if overrides.$field.is_some() {
                    self.$field = overrides.$field;
                })*
            };
        }
        take!(
            workers,
            worker_memory_limit,
            worker_timeout,
            process_memory_limit,
            transport,
            single_process,
            status_view,
            queue_depth,
            status_update_items,
            status_update_interval,
            liveness_poll_interval,
            hash_max_size_mb
        );
    }

    /// Validate the options and fill the gaps with defaults.
    ///
    /// # Returns
    ///
    /// The typed configuration, or [`EngineError::Configuration`] naming the
    /// first offending option.
    pub fn resolve(&self) -> Result<ProcessingConfig, EngineError> {
        let workers = non_negative("workers", self.workers.unwrap_or(0))?;
        let worker_memory_limit = non_negative(
            "worker_memory_limit",
            self.worker_memory_limit.unwrap_or(DEFAULT_WORKER_MEMORY_LIMIT as i64),
        )?;
        let process_memory_limit = non_negative(
            "process_memory_limit",
            self.process_memory_limit.unwrap_or(DEFAULT_PROCESS_MEMORY_LIMIT as i64),
        )?;
        let worker_timeout_minutes = positive(
            "worker_timeout",
            self.worker_timeout.unwrap_or(DEFAULT_WORKER_TIMEOUT_MINUTES),
        )?;

        let queue_depth = non_negative(
            "queue_depth",
            self.queue_depth.unwrap_or(DEFAULT_QUEUE_DEPTH as i64),
        )?;
        if queue_depth == 0 {
            return Err(EngineError::Configuration("queue_depth must be at least 1".to_string()));
        }
        let status_update_items = non_negative(
            "status_update_items",
            self.status_update_items.unwrap_or(DEFAULT_STATUS_UPDATE_ITEMS as i64),
        )?;
        if status_update_items == 0 {
            return Err(EngineError::Configuration(
                "status_update_items must be at least 1".to_string(),
            ));
        }

        let status_update_interval = positive(
            "status_update_interval",
            self.status_update_interval.unwrap_or(DEFAULT_STATUS_UPDATE_INTERVAL_SECS),
        )?;
        let liveness_poll_interval = positive(
            "liveness_poll_interval",
            self.liveness_poll_interval.unwrap_or(DEFAULT_LIVENESS_POLL_INTERVAL_SECS),
        )?;
        let hash_max_size_mb = non_negative(
            "hash_max_size_mb",
            self.hash_max_size_mb.unwrap_or(DEFAULT_HASH_MAX_SIZE_MB as i64),
        )?;

        Ok(ProcessingConfig {
            workers: resolve_worker_count(workers as usize, num_cpus::get()),
            worker_memory_limit,
            worker_timeout: seconds("worker_timeout", worker_timeout_minutes * 60.0)?,
            process_memory_limit,
            transport: self.transport.unwrap_or(TransportKind::MessageQueue),
            single_process: self.single_process.unwrap_or(false),
            status_view: self.status_view.unwrap_or_else(StatusViewMode::platform_default),
            queue_depth: queue_depth as usize,
            status_update_items,
            status_update_interval: seconds("status_update_interval", status_update_interval)?,
            liveness_poll_interval: seconds("liveness_poll_interval", liveness_poll_interval)?,
            hash_max_size_mb,
        })
    }
}

fn non_negative(name: &str, value: i64) -> Result<u64, EngineError> {
    u64::try_from(value)
        .map_err(|_| EngineError::Configuration(format!("{} must not be negative, got {}", name, value)))
}

fn positive(name: &str, value: f64) -> Result<f64, EngineError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(EngineError::Configuration(format!("{} must be greater than zero, got {}", name, value)))
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration, EngineError> {
    Duration::try_from_secs_f64(value)
        .map_err(|e| EngineError::Configuration(format!("{} is out of range: {}", name, e)))
}

/// Number of workers for a requested count; `0` means one per CPU but one.
pub fn resolve_worker_count(requested: usize, cpus: usize) -> usize {
    if requested == 0 {
        cpus.saturating_sub(1).max(1)
    } else {
        requested
    }
}

/// Validated, immutable configuration of one extraction run.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingConfig {
    pub workers: usize,
    /// Bytes, 0 = unlimited
    pub worker_memory_limit: u64,
    pub worker_timeout: Duration,
    /// Bytes, 0 = unlimited
    pub process_memory_limit: u64,
    pub transport: TransportKind,
    pub single_process: bool,
    pub status_view: StatusViewMode,
    pub queue_depth: usize,
    pub status_update_items: u64,
    pub status_update_interval: Duration,
    pub liveness_poll_interval: Duration,
    /// 0 disables hashing
    pub hash_max_size_mb: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            workers: resolve_worker_count(0, num_cpus::get()),
            worker_memory_limit: DEFAULT_WORKER_MEMORY_LIMIT,
            worker_timeout: Duration::from_secs_f64(DEFAULT_WORKER_TIMEOUT_MINUTES * 60.0),
            process_memory_limit: DEFAULT_PROCESS_MEMORY_LIMIT,
            transport: TransportKind::MessageQueue,
            single_process: false,
            status_view: StatusViewMode::platform_default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            status_update_items: DEFAULT_STATUS_UPDATE_ITEMS,
            status_update_interval: Duration::from_secs_f64(DEFAULT_STATUS_UPDATE_INTERVAL_SECS),
            liveness_poll_interval: Duration::from_secs_f64(DEFAULT_LIVENESS_POLL_INTERVAL_SECS),
            hash_max_size_mb: DEFAULT_HASH_MAX_SIZE_MB,
        }
    }
}

impl ProcessingConfig {
    /// Data-segment ceiling for one worker: the tighter of the worker and
    /// process limits, ignoring whichever is unlimited.
    pub fn effective_worker_memory_limit(&self) -> u64 {
        match (self.worker_memory_limit, self.process_memory_limit) {
            (0, process) => process,
            (worker, 0) => worker,
            (worker, process) => worker.min(process),
        }
    }
}
