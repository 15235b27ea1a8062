use std::io::{self, BufRead, Stdout, StdinLock, Write};

use anyhow::{Context, Result};

use crate::transport::{ForemanMessage, WorkerMessage};

/// Worker side of a task transport.
pub trait WorkerEndpoint {
    /// Block until the foreman sends something; `None` once it is gone
    fn receive(&mut self) -> Result<Option<ForemanMessage>>;

    fn send(&mut self, message: WorkerMessage) -> Result<()>;
}

/// Newline-delimited JSON over a reader and a writer, stdin and stdout
/// for a worker process.
pub struct StdioEndpoint<R: BufRead, W: Write> {
    input: R,
    output: W,
    line: String,
}

impl StdioEndpoint<StdinLock<'static>, Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> StdioEndpoint<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            line: String::new(),
        }
    }

    pub fn into_output(self) -> W {
        self.output
    }
}

impl<R: BufRead, W: Write> WorkerEndpoint for StdioEndpoint<R, W> {
    fn receive(&mut self) -> Result<Option<ForemanMessage>> {
        loop {
            self.line.clear();
            let read = self
                .input
                .read_line(&mut self.line)
                .context("Failed to read from foreman")?;
            if read == 0 {
                return Ok(None);
            }
            if self.line.trim().is_empty() {
                continue;
            }
            let message = serde_json::from_str(self.line.trim())
                .context("Malformed message from foreman")?;
            return Ok(Some(message));
        }
    }

    fn send(&mut self, message: WorkerMessage) -> Result<()> {
        serde_json::to_writer(&mut self.output, &message).context("Failed to serialize message")?;
        self.output
            .write_all(b"\n")
            .and_then(|_| self.output.flush())
            .context("Failed to write to foreman")
    }
}
