//! Status views: presentation of the [`ProcessingStatus`] read model.
//!
//! Views only ever read the aggregate. The foreman calls
//! [`StatusView::refresh`] on each liveness poll and once more at the end
//! of the run.

use std::io::{self, Write};

use log::{debug, info};

use crate::config::StatusViewMode;
use crate::status::process_status::ProcessStatus;
use crate::status::processing_status::ProcessingStatus;

pub trait StatusView {
    fn refresh(&mut self, status: &ProcessingStatus);
}

/// Create the view for the configured mode
pub fn create_status_view(mode: StatusViewMode) -> Box<dyn StatusView> {
    match mode {
        StatusViewMode::Linear => Box::new(LinearStatusView),
        StatusViewMode::Window => Box::new(WindowStatusView::new(io::stdout())),
        StatusViewMode::None => Box::new(NullStatusView),
    }
}

/// Logs one line per poll in which something changed.
#[derive(Debug, Default)]
pub struct LinearStatusView;

impl StatusView for LinearStatusView {
    fn refresh(&mut self, status: &ProcessingStatus) {
        if !status.has_changed() {
            return;
        }

        let totals = status.totals();
        info!(
            "{} workers: {} sources consumed, {} events produced, {} errors",
            totals.number_of_workers,
            totals.counters.consumed_sources,
            totals.counters.produced_events,
            totals.counters.produced_errors
        );
        for worker in status.workers_status() {
            debug!(
                "{} (PID {}) {}: {}",
                worker.identifier, worker.pid, worker.status, worker.display_name
            );
        }
    }
}

/// Redraws a per-process table on every poll.
pub struct WindowStatusView<W: Write> {
    output: W,
}

impl<W: Write> WindowStatusView<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    fn draw(&mut self, status: &ProcessingStatus) -> io::Result<()> {
        write!(self.output, "\x1b[2J\x1b[H")?;
        writeln!(
            self.output,
            "{:<12} {:>8} {:<12} {:>9} {:>11} {:>8} {:>10}  {}",
            "Identifier", "PID", "Status", "Sources", "Events", "Errors", "Memory", "File"
        )?;
        for process in status.processes() {
            self.draw_row(process)?;
        }

        let totals = status.totals();
        writeln!(self.output)?;
        writeln!(
            self.output,
            "Totals: {} sources, {} events, {} errors",
            totals.counters.consumed_sources,
            totals.counters.produced_events,
            totals.counters.produced_errors
        )?;
        if !status.error_path_specs.is_empty() {
            writeln!(self.output, "Abandoned: {}", status.error_path_specs.len())?;
        }
        if status.aborted {
            writeln!(self.output, "Processing aborted")?;
        }
        self.output.flush()
    }

    fn draw_row(&mut self, process: &ProcessStatus) -> io::Result<()> {
        let counters = process.counters();
        let memory = process
            .used_memory
            .map(format_bytes)
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            self.output,
            "{:<12} {:>8} {:<12} {:>9} {:>11} {:>8} {:>10}  {}",
            process.identifier,
            process.pid,
            process.status,
            counters.consumed_sources,
            counters.produced_events,
            counters.produced_errors,
            memory,
            process.display_name
        )
    }
}

impl<W: Write> StatusView for WindowStatusView<W> {
    fn refresh(&mut self, status: &ProcessingStatus) {
        if let Err(e) = self.draw(status) {
            debug!("Failed to draw status window: {}", e);
        }
    }
}

/// Renders nothing.
#[derive(Debug, Default)]
pub struct NullStatusView;

impl StatusView for NullStatusView {
    fn refresh(&mut self, _status: &ProcessingStatus) {}
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
