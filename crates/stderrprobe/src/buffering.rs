//! Buffering of the stream under test.
//!
//! A process installs its stderr buffer at most once, before the measured
//! write. The buffer lives in a process-wide cell so that both normal
//! teardown and the watchdog can flush what is still pending.

use std::io::{self, BufWriter, ErrorKind, LineWriter, Stderr, Write};
use std::sync::{Mutex, OnceLock, PoisonError, TryLockError};

use stderrprobe_grammar::{BufferMode, WriteKind, WriteSpec};
use stderrprobe_transport::filler;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BufferingError {
    #[error("stderr buffering is already installed")]
    AlreadyInstalled,

    #[error("buffer size {size} is too small")]
    InvalidSize { size: usize },
}

static STDERR_BUFFER: OnceLock<Mutex<StreamBuffer<Stderr>>> = OnceLock::new();

/// A writer with one of the probe's buffering modes in front of it.
pub struct StreamBuffer<W: Write> {
    sink: Sink<W>,
}

enum Sink<W: Write> {
    Direct(W),
    Line(LineWriter<W>),
    Full(BufWriter<W>),
}

impl<W: Write> StreamBuffer<W> {
    /// Wrap `inner`; `None` leaves it as it is.
    ///
    /// Buffered modes allocate exactly `size` bytes up front.
    pub fn new(inner: W, mode: Option<BufferMode>) -> Result<Self, BufferingError> {
        let sink = match mode {
            None | Some(BufferMode::Unbuffered) => Sink::Direct(inner),
            Some(BufferMode::LineBuffered { size }) => {
                check_size(size)?;
                Sink::Line(LineWriter::with_capacity(size, inner))
            }
            Some(BufferMode::FullyBuffered { size }) => {
                check_size(size)?;
                Sink::Full(BufWriter::with_capacity(size, inner))
            }
        };
        Ok(Self { sink })
    }

    pub fn get_ref(&self) -> &W {
        match &self.sink {
            Sink::Direct(inner) => inner,
            Sink::Line(writer) => writer.get_ref(),
            Sink::Full(writer) => writer.get_ref(),
        }
    }
}

impl<W: Write> Write for StreamBuffer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            Sink::Direct(inner) => inner.write(buf),
            Sink::Line(writer) => writer.write(buf),
            Sink::Full(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Direct(inner) => inner.flush(),
            Sink::Line(writer) => writer.flush(),
            Sink::Full(writer) => writer.flush(),
        }
    }
}

fn check_size(size: usize) -> Result<(), BufferingError> {
    if size < 2 {
        return Err(BufferingError::InvalidSize { size });
    }
    Ok(())
}

/// Put this process's stderr behind `mode`. Succeeds once per process.
pub fn install(
    mode: Option<BufferMode>,
) -> Result<&'static Mutex<StreamBuffer<Stderr>>, BufferingError> {
    let buffer = StreamBuffer::new(io::stderr(), mode)?;
    let mut fresh = false;
    let installed = STDERR_BUFFER.get_or_init(|| {
        fresh = true;
        Mutex::new(buffer)
    });
    if !fresh {
        return Err(BufferingError::AlreadyInstalled);
    }
    debug!(?mode, "installed stderr buffer");
    Ok(installed)
}

/// Flush the installed buffer, waiting for any writer holding it.
pub fn flush_installed() {
    if let Some(buffer) = STDERR_BUFFER.get() {
        let mut stream = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = stream.flush();
    }
}

/// Flush the installed buffer unless another thread is in the middle of
/// a write to it.
pub fn try_flush_installed() {
    if let Some(buffer) = STDERR_BUFFER.get() {
        match buffer.try_lock() {
            Ok(mut stream) => {
                let _ = stream.flush();
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                let _ = poisoned.into_inner().flush();
            }
            Err(TryLockError::WouldBlock) => {}
        }
    }
}

/// The measured message: `count` filler bytes, plus `\n` for `write-nl`.
pub fn compose_message(spec: &WriteSpec) -> Vec<u8> {
    let mut message = filler(spec.count);
    if spec.kind == WriteKind::WriteNl {
        message.push(b'\n');
    }
    message
}

/// Write as much of `data` as `out` accepts and return how much that was.
///
/// Stops early when the writer accepts nothing; an error is returned only if
/// it occurs before any byte was accepted.
pub fn write_counted<W: Write>(out: &mut W, data: &[u8]) -> io::Result<usize> {
    let mut accepted = 0;
    while accepted < data.len() {
        match out.write(&data[accepted..]) {
            Ok(0) => break,
            Ok(n) => accepted += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) if accepted > 0 => break,
            Err(err) => return Err(err),
        }
    }
    Ok(accepted)
}
