//! Reporting of fetch progress and failures
//!
//! The fetch orchestrator never writes to the terminal or a logger directly; it
//! records messages through a `Reporter` handed to it at construction.

use crossterm::style::Stylize;
use log::Level;
use std::io::{self, Write};
use std::sync::Mutex;

/// Sink for progress and failure messages
pub trait Reporter: Send + Sync {
    /// Records a message at the given level
    fn record(&self, level: Level, message: &str);
}

/// Forwards every record to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn record(&self, level: Level, message: &str) {
        log::log!(level, "{}", message);
    }
}

/// Prints colored status lines and forwards every record to `log`
///
/// Info, warn and error records become one status line each; debug and trace
/// records only reach the logger.
pub struct TerminalReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl TerminalReporter<io::Stderr> {
    /// Creates a reporter printing to standard error
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> TerminalReporter<W> {
    /// Creates a reporter printing to `out`
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> Reporter for TerminalReporter<W> {
    fn record(&self, level: Level, message: &str) {
        LogReporter.record(level, message);

        let line = match level {
            Level::Error => format!("{} {}", "✖".red(), message.red()),
            Level::Warn => format!("{} {}", "!".yellow(), message.yellow()),
            Level::Info => format!("{} {}", "✔".green(), message.cyan()),
            Level::Debug | Level::Trace => return,
        };
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", line);
        }
    }
}
