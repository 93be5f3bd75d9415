//! Report lines on the shared stdout.
//!
//! Every process in a probe tree writes to the same stdout. A line is
//! written whole while holding the in-process gate and the cross-process
//! [`SyncLock`], so lines from parent, child and the socket reader thread
//! never interleave.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use clap::ValueEnum;
use serde::Serialize;
use tracing_subscriber::fmt::MakeWriter;

use crate::context::Role;
use crate::sync::{SyncError, SyncLock};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `[RPT<symbol>:<role>] <message>`
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Startup echo of the invocation.
    Command,
    Report,
}

impl Tag {
    fn as_str(self) -> &'static str {
        match self {
            Tag::Command => "CMD",
            Tag::Report => "RPT",
        }
    }
}

#[derive(Serialize)]
struct ReportLine<'a> {
    tag: &'a str,
    stream: char,
    role: &'a str,
    pid: u32,
    message: &'a str,
}

/// The synchronized logger of one process.
#[derive(Debug)]
pub struct Reporter {
    lock: SyncLock,
    gate: Mutex<()>,
    symbol: char,
    role: Role,
    format: OutputFormat,
    pid: u32,
}

impl Reporter {
    pub fn new(lock: SyncLock, symbol: char, role: Role, format: OutputFormat) -> Self {
        Self {
            lock,
            gate: Mutex::new(()),
            symbol,
            role,
            format,
            pid: std::process::id(),
        }
    }

    /// Write one `RPT` line. Blocks until the cross-process lock is free.
    pub fn report(&self, message: fmt::Arguments<'_>) -> Result<(), SyncError> {
        self.emit(Tag::Report, &message.to_string())
    }

    /// Write the `CMD` line echoing this process's command tokens.
    pub fn announce<T: fmt::Display>(&self, tokens: &[T]) -> Result<(), SyncError> {
        let line = tokens
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        self.emit(Tag::Command, &line)
    }

    pub fn render(&self, tag: Tag, message: &str) -> String {
        match self.format {
            OutputFormat::Text => format!(
                "[{}{}:{}] {message}\n",
                tag.as_str(),
                self.symbol,
                self.role.tag()
            ),
            OutputFormat::Json => {
                let line = ReportLine {
                    tag: tag.as_str(),
                    stream: self.symbol,
                    role: self.role.tag(),
                    pid: self.pid,
                    message,
                };
                let mut rendered =
                    serde_json::to_string(&line).unwrap_or_else(|_| "{}".to_string());
                rendered.push('\n');
                rendered
            }
        }
    }

    /// Write already formatted bytes under both locks.
    ///
    /// Nothing in here may emit a tracing event: the subscriber writes
    /// through this same gate.
    pub fn write_locked(&self, bytes: &[u8]) -> Result<(), SyncError> {
        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self.lock.acquire()?;
        let mut out = io::stdout().lock();
        let _ = out.write_all(bytes);
        let _ = out.flush();
        Ok(())
    }

    /// Remove the shared lock file if this process created it.
    pub fn release_sync(&self) {
        self.lock.remove();
    }

    fn emit(&self, tag: Tag, message: &str) -> Result<(), SyncError> {
        self.write_locked(self.render(tag, message).as_bytes())
    }
}

/// `report!(target, "fmt", args..)` writes one `RPT` line through anything
/// with a `report(fmt::Arguments)` method.
macro_rules! report {
    ($target:expr, $($arg:tt)+) => {
        $target.report(format_args!($($arg)+))
    };
}

pub(crate) use report;

/// Tracing writer that hands each formatted event to a [`Reporter`].
#[derive(Debug, Clone)]
pub struct ReportMakeWriter {
    reporter: Arc<Reporter>,
}

impl ReportMakeWriter {
    pub fn new(reporter: Arc<Reporter>) -> Self {
        Self { reporter }
    }
}

impl<'a> MakeWriter<'a> for ReportMakeWriter {
    type Writer = EventWriter;

    fn make_writer(&'a self) -> Self::Writer {
        EventWriter {
            reporter: Arc::clone(&self.reporter),
            buf: Vec::new(),
        }
    }
}

/// Collects one event and writes it whole when dropped.
#[derive(Debug)]
pub struct EventWriter {
    reporter: Arc<Reporter>,
    buf: Vec<u8>,
}

impl Write for EventWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EventWriter {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            let _ = self.reporter.write_locked(&self.buf);
        }
    }
}
