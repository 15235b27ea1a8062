use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use rust_extractor::cli::{Args, Commands, WorkerArgs};
use rust_extractor::config::ProcessingOptions;
use rust_extractor::constants::DEFAULT_REPORT_NAME;
use rust_extractor::engine::ExtractionEngine;
use rust_extractor::extractors::{DirectorySource, FileStatProcessor, JsonLinesSinkFactory, SinkFactory};
use rust_extractor::governor::apply_memory_limit;
use rust_extractor::status::view::create_status_view;
use rust_extractor::transport::WorkerCommand;
use rust_extractor::worker::{run_worker, StdioEndpoint, WorkerSettings};

fn main() -> Result<()> {
    let args = Args::parse();

    // A worker's stdout is its message queue
    let mode = match args.command {
        Some(Commands::Worker(_)) => TerminalMode::Stderr,
        _ => TerminalMode::Mixed,
    };
    initialize_logging(args.verbose, mode)?;

    match &args.command {
        Some(Commands::InitConfig { path }) => init_config(path),
        Some(Commands::Worker(worker)) => run_worker_process(worker),
        None => run_extraction(&args),
    }
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool, mode: TerminalMode) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(log_level, Config::default(), mode, ColorChoice::Auto)
        .context("Failed to initialize logger")?;
    Ok(())
}

fn init_config(path: &Path) -> Result<()> {
    info!("Creating default configuration file at {}", path.display());
    ProcessingOptions::with_defaults().save_to_yaml_file(path)?;
    info!("Configuration created successfully");
    Ok(())
}

fn run_worker_process(args: &WorkerArgs) -> Result<()> {
    if let Err(e) = apply_memory_limit(args.memory_limit) {
        warn!("Worker {} runs without a memory limit: {:#}", args.identifier, e);
    }

    let status_update_interval = Duration::try_from_secs_f64(args.status_update_interval)
        .map_err(|_| anyhow!("Invalid status update interval: {}", args.status_update_interval))?;
    let settings = WorkerSettings {
        identifier: args.identifier.clone(),
        pid: std::process::id(),
        status_update_items: args.status_update_items,
        status_update_interval,
    };

    let sinks = JsonLinesSinkFactory::new(&args.output)?;
    let sink = sinks.open(&args.identifier)?;
    let processor = FileStatProcessor::new(args.hash_max_size);

    let counters = run_worker(StdioEndpoint::stdio(), &settings, &processor, sink)?;
    info!(
        "Worker {} done: {} sources, {} events, {} errors",
        args.identifier, counters.consumed_sources, counters.produced_events, counters.produced_errors
    );
    Ok(())
}

fn run_extraction(args: &Args) -> Result<()> {
    let source_dir = args
        .source
        .as_ref()
        .ok_or_else(|| anyhow!("No source given, use --source <DIR>"))?;

    let mut options = ProcessingOptions::load(args.config.as_deref())?;
    options.merge(args.processing_overrides());
    let config = options.resolve()?;

    if let Err(e) = apply_memory_limit(config.process_memory_limit) {
        warn!("Running without a process memory limit: {:#}", e);
    }

    let output_dir = match &args.output {
        Some(path) => path.clone(),
        None => env::temp_dir().join("rust-extractor"),
    };
    let sinks = JsonLinesSinkFactory::new(&output_dir)?;
    info!("Writing events to {}", output_dir.display());

    let worker_command =
        WorkerCommand::current_exe()?.with_args(args.worker_args(&output_dir, config.hash_max_size_mb));

    let mut view = create_status_view(config.status_view);
    let source = DirectorySource::new(source_dir)?;
    let engine = ExtractionEngine::new(
        config.clone(),
        Arc::new(FileStatProcessor::new(config.hash_max_size_mb)),
        Arc::new(sinks),
    )
    .with_worker_command(worker_command);

    let report = engine.run(Box::new(source), view.as_mut())?;

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| output_dir.join(DEFAULT_REPORT_NAME));
    report.write_to_file(&report_path)?;

    if report.is_complete() {
        info!("Extraction completed: {} tasks", report.completed_tasks);
    } else {
        warn!(
            "Extraction incomplete: {} tasks completed, {} abandoned, aborted: {}",
            report.completed_tasks, report.abandoned_tasks, report.status.aborted
        );
    }
    Ok(())
}
