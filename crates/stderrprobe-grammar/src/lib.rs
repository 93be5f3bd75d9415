//! Command grammar for the stderrprobe harness.
//!
//! A probe invocation is a flat list of whitespace-separated tokens:
//! a command name followed by a fixed, per-command sequence of keywords
//! and integers. This crate turns that list into a typed [`Command`] or a
//! [`GrammarError`] that points at the place the line diverged.
//!
//! Nothing in here touches the operating system.

pub mod command;
pub mod error;
pub mod limits;
pub mod token;

pub use command::{BufferMode, Command, ParsedArguments, PipeSpec, WriteKind, WriteSpec};
pub use error::{GrammarError, Result};
pub use limits::Limits;
pub use token::{CommandKind, Identifier, Token, TokenError};
