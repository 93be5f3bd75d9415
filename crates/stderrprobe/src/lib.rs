//! Probe how a child's stderr behaves across redirection channels.
//!
//! stderrprobe runs one scenario per process: it writes to its own stderr
//! under a chosen buffering mode, or sets up a pipe, an inherited handle or
//! a socket, launches a copy of itself with stderr bound to that channel and
//! reports what the other end observed.
//!
//! # Crate Structure
//!
//! - [`grammar`]: Command grammar and validator
//! - [`transport`]: Pipes, inheritable handles, loopback sockets

/// Re-export grammar types.
pub mod grammar {
    pub use stderrprobe_grammar::*;
}

/// Re-export transport types.
pub mod transport {
    pub use stderrprobe_transport::*;
}
