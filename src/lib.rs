//! # rust-extractor
//!
//! A multi-process extraction engine for forensic timelines.
//!
//! ## Overview
//!
//! A foreman enumerates path specifications through a pluggable source,
//! hands each one as a task to a pool of workers and collects the timeline
//! events they produce. The foreman keeps a live status model of every
//! process, enforces memory ceilings, kills and replaces workers that hang
//! or crash, requeues their task once and gives up on it the second time.
//!
//! ## Features
//!
//! - **Process isolation**: workers as child processes exchanging JSON lines
//!   over stdio, or as threads for embedding and tests
//! - **Status model**: six monotonic counters per process with deltas,
//!   totals and a live console view
//! - **Resource governor**: `setrlimit` ceilings, memory sampling and
//!   liveness timeouts
//! - **Single-process mode** for debugging
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rust_extractor::config::{ProcessingOptions, TransportKind};
//! use rust_extractor::engine::ExtractionEngine;
//! use rust_extractor::extractors::{FileStatProcessor, MemorySinkFactory, StaticSource};
//! use rust_extractor::status::view::LinearStatusView;
//!
//! # fn main() -> anyhow::Result<()> {
//! let options = ProcessingOptions {
//!     workers: Some(2),
//!     transport: Some(TransportKind::LocalQueue),
//!     ..ProcessingOptions::default()
//! };
//! let sinks = MemorySinkFactory::new();
//! let engine = ExtractionEngine::new(
//!     options.resolve()?,
//!     Arc::new(FileStatProcessor::new(16)),
//!     Arc::new(sinks.clone()),
//! );
//!
//! let source = StaticSource::new(["/etc/hosts", "/etc/passwd"]);
//! let report = engine.run(Box::new(source), &mut LinearStatusView)?;
//! println!("{} events", sinks.records().events.len());
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: Processing options and their validation
//! - [`engine`]: Foreman, tasks, intake queue and run report
//! - [`worker`]: Worker loop and the extraction context
//! - [`transport`]: Foreman/worker messages and the two transports
//! - [`governor`]: Memory ceilings, memory sampling and liveness
//! - [`status`]: Status model, totals and status views
//! - [`extractors`]: Collaborator traits and reference implementations
//!
//! ## Feature Flags
//!
//! - `message_queue` (default): worker processes over stdio

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Processing options and the validated configuration
pub mod config;

/// Application constants and documented defaults
pub mod constants;

/// Foreman event loop and run lifecycle
pub mod engine;

/// Engine error taxonomy
pub mod error;

/// Sources, processors and sinks the engine is handed
pub mod extractors;

/// Memory ceilings, memory sampling and worker liveness
pub mod governor;

/// Core data models
pub mod models;

/// Per-process status and its aggregate
pub mod status;

/// Messages between foreman and workers and how they travel
pub mod transport;

/// Utility functions
pub mod utils;

/// Worker loop
pub mod worker;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
