//! Byte transports used by the stderrprobe harness.
//!
//! Provides the channel endpoints a probe scenario moves bytes through:
//! - anonymous pipes with a requested capacity
//! - descriptors duplicated so a child process inherits them
//! - connected loopback stream sockets that can stand in for a file
//!
//! Everything a scenario opens is an [`Endpoint`], which closes its
//! descriptor when dropped.

pub mod endpoint;
pub mod error;
pub mod handle;
pub mod pipe;
pub mod socket;
pub mod stream_kind;

pub use endpoint::{filler, Endpoint, EndpointKind, FILLER};
pub use error::{Result, TransportError};
pub use pipe::AnonymousPipe;
pub use socket::{ReadSocket, SocketProvider};
pub use stream_kind::StreamKind;
