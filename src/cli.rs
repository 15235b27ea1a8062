use clap::{Args as ClapArgs, Parser, Subcommand};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{ProcessingOptions, StatusViewMode, TransportKind};
use crate::constants::DEFAULT_CONFIG_NAME;

/// Command-line arguments for the rust-extractor tool.
///
/// Processing options given here override the ones read from `--config`.
/// Numeric options accept negative values on purpose: they are rejected
/// with a configuration error instead of a parse error.
#[derive(Parser, Debug)]
#[clap(name = "rust-extractor", about = "Multi-process forensic extraction engine")]
pub struct Args {
    /// Directory to extract timeline events from
    #[clap(short, long)]
    pub source: Option<PathBuf>,

    /// Directory for event files and the report (default: %TEMP%/rust-extractor or /tmp/rust-extractor)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Path to processing options YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Number of workers, 0 picks one per CPU minus one
    #[clap(long, allow_negative_numbers = true)]
    pub workers: Option<i64>,

    /// Data-segment limit of each worker process in bytes, 0 for none
    #[clap(long, allow_negative_numbers = true)]
    pub worker_memory_limit: Option<i64>,

    /// Data-segment limit of the foreman process in bytes, 0 for none
    #[clap(long, allow_negative_numbers = true)]
    pub process_memory_limit: Option<i64>,

    /// Minutes a busy worker may go without progress before it is killed
    #[clap(long, allow_negative_numbers = true)]
    pub worker_timeout: Option<f64>,

    /// How tasks travel between the foreman and its workers
    #[clap(long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Process everything inside the foreman, without workers
    #[clap(long)]
    pub single_process: bool,

    /// Status display
    #[clap(long, value_enum)]
    pub status_view: Option<StatusViewMode>,

    /// Depth of the queue between the source and the foreman
    #[clap(long, allow_negative_numbers = true)]
    pub queue_depth: Option<i64>,

    /// Do not hash files larger than this many MB, 0 disables hashing
    #[clap(long, allow_negative_numbers = true)]
    pub hash_max_size: Option<i64>,

    /// Report path (default: <output>/extraction-report.json)
    #[clap(long)]
    pub report: Option<PathBuf>,

    /// Verbose logging
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

impl Args {
    /// The processing options set on the command line
    pub fn processing_overrides(&self) -> ProcessingOptions {
        ProcessingOptions {
            workers: self.workers,
            worker_memory_limit: self.worker_memory_limit,
            worker_timeout: self.worker_timeout,
            process_memory_limit: self.process_memory_limit,
            transport: self.transport,
            single_process: self.single_process.then_some(true),
            status_view: self.status_view,
            queue_depth: self.queue_depth,
            hash_max_size_mb: self.hash_max_size,
            ..ProcessingOptions::default()
        }
    }

    /// Arguments appended to the `worker` subcommand of every worker process
    pub fn worker_args(&self, output_dir: &Path, hash_max_size_mb: u64) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--output"),
            output_dir.as_os_str().to_os_string(),
            OsString::from("--hash-max-size"),
            OsString::from(hash_max_size_mb.to_string()),
        ];
        if self.verbose {
            args.push(OsString::from("--verbose"));
        }
        args
    }
}

/// Available subcommands for the extractor.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a configuration file holding every default
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = DEFAULT_CONFIG_NAME)]
        path: PathBuf,
    },

    /// Serve tasks from the foreman over stdin and stdout
    #[clap(hide = true)]
    Worker(WorkerArgs),
}

/// Options the foreman passes to a worker process.
#[derive(ClapArgs, Debug)]
pub struct WorkerArgs {
    #[clap(long)]
    pub identifier: String,

    /// Directory for the worker's event file
    #[clap(long)]
    pub output: PathBuf,

    /// Data-segment limit in bytes, 0 for none
    #[clap(long, default_value = "0")]
    pub memory_limit: u64,

    #[clap(long, default_value = "100")]
    pub status_update_items: u64,

    /// Seconds
    #[clap(long, default_value = "1.0")]
    pub status_update_interval: f64,

    /// Do not hash files larger than this many MB, 0 disables hashing
    #[clap(long, default_value = "0")]
    pub hash_max_size: u64,
}
