use std::io;

use stderrprobe_transport::TransportError;

use crate::buffering::BufferingError;
use crate::launcher::LaunchError;
use crate::sync::SyncError;

// Fatal scenario errors abort instead of returning a code.
pub const SUCCESS: i32 = 0;
pub const USAGE: i32 = 1;
pub const WATCHDOG: i32 = 99;

pub type ProbeResult<T> = Result<T, ProbeError>;

/// Anything that ends a running scenario.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("sync: {0}")]
    Sync(#[from] SyncError),

    #[error("launch: {0}")]
    Launch(#[from] LaunchError),

    #[error("buffering: {0}")]
    Buffering(#[from] BufferingError),

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{condition}")]
    Assertion {
        condition: String,
        file: &'static str,
        line: u32,
    },

    #[error("read request of {requested} bytes exceeds the limit of {limit}")]
    ReadTooLarge { requested: usize, limit: usize },

    #[error("write request of {requested} bytes is not below the limit of {limit}")]
    WriteTooLarge { requested: usize, limit: usize },

    #[error("socket reader thread panicked")]
    ReaderPanicked,
}

impl ProbeError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        ProbeError::Io { context, source }
    }

    /// The report line announcing this error before the process aborts.
    pub fn diagnostic(&self) -> String {
        match self {
            ProbeError::Assertion {
                condition,
                file,
                line,
            } => format!(":ASSERTION-FAILED {condition} :FILE {file} :LINE {line}"),
            other => format!(":FATAL {other}"),
        }
    }
}

/// Return [`ProbeError::Assertion`] from the enclosing function unless the
/// condition holds.
macro_rules! ensure {
    ($cond:expr) => {
        if !$cond {
            return Err($crate::exit::ProbeError::Assertion {
                condition: stringify!($cond).to_string(),
                file: file!(),
                line: line!(),
            });
        }
    };
}

pub(crate) use ensure;
