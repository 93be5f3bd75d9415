use std::net::SocketAddr;

/// Errors that can occur while setting up or using a probe channel.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The anonymous pipe could not be created.
    #[error("failed to create pipe: {0}")]
    Pipe(std::io::Error),

    /// The requested pipe capacity could not be applied.
    #[error("failed to set pipe capacity to {requested} bytes: {source}")]
    PipeCapacity {
        requested: usize,
        source: std::io::Error,
    },

    /// A descriptor could not be duplicated.
    #[error("failed to duplicate handle: {0}")]
    Duplicate(std::io::Error),

    /// A handle value received from a parent does not name an open descriptor.
    #[error("handle {handle} is not an open descriptor: {source}")]
    InvalidHandle {
        handle: u64,
        source: std::io::Error,
    },

    /// Failed to bind the read socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect the write socket.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// No socket provider can back a generic I/O handle.
    #[error("no socket provider can act as a generic I/O handle")]
    NoHandleCapableProvider,

    /// An I/O error occurred on an endpoint.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The primitive does not exist on this platform.
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

pub type Result<T> = std::result::Result<T, TransportError>;
