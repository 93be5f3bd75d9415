use std::fmt;

use crate::error::{GrammarError, Result};
use crate::limits::Limits;
use crate::token::{CommandKind, Identifier, Token};

/// Whether the measured write ends with a newline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// `COUNT` filler bytes.
    Write,
    /// `COUNT` filler bytes followed by `\n`.
    WriteNl,
}

impl WriteKind {
    fn identifier(self) -> Identifier {
        match self {
            WriteKind::Write => Identifier::Write,
            WriteKind::WriteNl => Identifier::WriteNl,
        }
    }
}

/// Buffering mode requested for the stream under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferMode {
    Unbuffered,
    LineBuffered { size: usize },
    FullyBuffered { size: usize },
}

impl fmt::Display for BufferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferMode::Unbuffered => write!(f, "{}", Identifier::Unbuf),
            BufferMode::LineBuffered { size } => write!(f, "{} {size}", Identifier::Lnbuf),
            BufferMode::FullyBuffered { size } => write!(f, "{} {size}", Identifier::Flbuf),
        }
    }
}

/// The `(write|write-nl) COUNT [unbuf|(lnbuf|flbuf) BUFSIZE]` tail shared by
/// every command that ends in a stderr write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSpec {
    pub kind: WriteKind,
    pub count: usize,
    pub buffering: Option<BufferMode>,
}

impl WriteSpec {
    /// Number of bytes the measured write will request.
    pub fn message_len(&self) -> usize {
        match self.kind {
            WriteKind::Write => self.count,
            WriteKind::WriteNl => self.count + 1,
        }
    }
}

impl fmt::Display for WriteSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.identifier(), self.count)?;
        if let Some(mode) = self.buffering {
            write!(f, " {mode}")?;
        }
        Ok(())
    }
}

/// Parameters of the `pipe` and `pipe-handle-to-child` commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipeSpec {
    /// Requested pipe capacity; `0` keeps the system default.
    pub pipe_size: usize,
    pub read_count: usize,
    pub write_count: usize,
}

/// A validated probe command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToStderr(WriteSpec),
    ToChildStderr(WriteSpec),
    Pipe(PipeSpec),
    PipeHandleToChild(PipeSpec),
    /// Internal: write `write_count` filler bytes to an inherited handle.
    ToHandle {
        handle: u64,
        write_count: usize,
    },
    PipeToChildStderr {
        pipe_size: usize,
        read_count: usize,
        child: WriteSpec,
    },
    SockToChildStderr {
        read_count: usize,
        child: WriteSpec,
    },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::ToStderr(_) => CommandKind::ToStderr,
            Command::ToChildStderr(_) => CommandKind::ToChildStderr,
            Command::Pipe(_) => CommandKind::Pipe,
            Command::PipeHandleToChild(_) => CommandKind::PipeHandleToChild,
            Command::ToHandle { .. } => CommandKind::ToHandle,
            Command::PipeToChildStderr { .. } => CommandKind::PipeToChildStderr,
            Command::SockToChildStderr { .. } => CommandKind::SockToChildStderr,
        }
    }

    /// The `to-stderr` command a child runs on behalf of this command.
    pub fn child_command(&self) -> Option<Command> {
        match self {
            Command::ToChildStderr(spec)
            | Command::PipeToChildStderr { child: spec, .. }
            | Command::SockToChildStderr { child: spec, .. } => Some(Command::ToStderr(*spec)),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    /// Canonical token form, parseable by [`ParsedArguments::parse`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.kind();
        match self {
            Command::ToStderr(spec) | Command::ToChildStderr(spec) => write!(f, "{name} {spec}"),
            Command::Pipe(spec) | Command::PipeHandleToChild(spec) => write!(
                f,
                "{name} {} {} {} {} {} {}",
                Identifier::PipeSize,
                spec.pipe_size,
                Identifier::Read,
                spec.read_count,
                Identifier::Write,
                spec.write_count
            ),
            Command::ToHandle {
                handle,
                write_count,
            } => write!(f, "{name} {handle} {write_count}"),
            Command::PipeToChildStderr {
                pipe_size,
                read_count,
                child,
            } => write!(
                f,
                "{name} {} {pipe_size} {} {read_count} {child}",
                Identifier::PipeSize,
                Identifier::Read
            ),
            Command::SockToChildStderr { read_count, child } => {
                write!(f, "{name} {} {read_count} {child}", Identifier::Read)
            }
        }
    }
}

/// A fully validated command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedArguments {
    tokens: Vec<Token>,
    command: Command,
}

impl ParsedArguments {
    /// Validate `args` (program name already removed) against the grammar.
    pub fn parse<S: AsRef<str>>(args: &[S], limits: &Limits) -> Result<Self> {
        let first: &str = args.first().ok_or(GrammarError::MissingCommand)?.as_ref();
        let kind = match Token::classify(first) {
            Ok(Token::Identifier(ident)) => ident.command(),
            _ => None,
        }
        .ok_or_else(|| GrammarError::UnknownCommand(first.to_string()))?;

        let mut parser = Parser {
            args,
            pos: 1,
            tokens: vec![Token::Identifier(kind.identifier())],
            kind,
            limits,
        };
        let command = parser.command()?;
        parser.finish()?;

        Ok(Self {
            tokens: parser.tokens,
            command,
        })
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn into_command(self) -> Command {
        self.command
    }
}

struct Parser<'a, S> {
    args: &'a [S],
    pos: usize,
    tokens: Vec<Token>,
    kind: CommandKind,
    limits: &'a Limits,
}

impl<S: AsRef<str>> Parser<'_, S> {
    fn command(&mut self) -> Result<Command> {
        let command = match self.kind {
            CommandKind::ToStderr => Command::ToStderr(self.write_spec()?),
            CommandKind::ToChildStderr => Command::ToChildStderr(self.write_spec()?),
            CommandKind::Pipe => Command::Pipe(self.pipe_spec()?),
            CommandKind::PipeHandleToChild => Command::PipeHandleToChild(self.pipe_spec()?),
            CommandKind::ToHandle => {
                let handle = self.integer(|v| v >= 0, "HANDLE must be >= 0")?;
                let write_count = self.integer(|v| v >= 0, "WRITE-COUNT must be >= 0")?;
                Command::ToHandle {
                    handle: handle as u64,
                    write_count: to_usize(write_count),
                }
            }
            CommandKind::PipeToChildStderr => {
                self.keyword(Identifier::PipeSize)?;
                let pipe_size = self.integer(|v| v >= 0, "PSIZE must be >= 0")?;
                self.keyword(Identifier::Read)?;
                let read_count = self.integer(|v| v >= 0, "RCOUNT must be >= 0")?;
                Command::PipeToChildStderr {
                    pipe_size: to_usize(pipe_size),
                    read_count: to_usize(read_count),
                    child: self.write_spec()?,
                }
            }
            CommandKind::SockToChildStderr => {
                self.keyword(Identifier::Read)?;
                let read_count = self.integer(|v| v >= 0, "RCOUNT must be >= 0")?;
                Command::SockToChildStderr {
                    read_count: to_usize(read_count),
                    child: self.write_spec()?,
                }
            }
        };
        Ok(command)
    }

    fn write_spec(&mut self) -> Result<WriteSpec> {
        let kind = match self.one_of(&[Identifier::Write, Identifier::WriteNl])? {
            Identifier::WriteNl => WriteKind::WriteNl,
            _ => WriteKind::Write,
        };
        let max_count = self.limits.max_write_count;
        let count = self.integer(
            |v| v > 0 && (v as u64) < max_count as u64,
            &format!("COUNT must be in 1..{max_count}"),
        )?;

        let buffering = if self.at_end() {
            None
        } else {
            let mode = self.one_of(&[Identifier::Unbuf, Identifier::Lnbuf, Identifier::Flbuf])?;
            match mode {
                Identifier::Unbuf => Some(BufferMode::Unbuffered),
                Identifier::Lnbuf => Some(BufferMode::LineBuffered {
                    size: self.buffer_size()?,
                }),
                _ => Some(BufferMode::FullyBuffered {
                    size: self.buffer_size()?,
                }),
            }
        };

        Ok(WriteSpec {
            kind,
            count: to_usize(count),
            buffering,
        })
    }

    fn pipe_spec(&mut self) -> Result<PipeSpec> {
        self.keyword(Identifier::PipeSize)?;
        let pipe_size = self.integer(|v| v >= 0, "SIZE must be >= 0")?;
        self.keyword(Identifier::Read)?;
        let read_count = self.integer(|v| v >= 0, "RCOUNT must be >= 0")?;
        self.keyword(Identifier::Write)?;
        let max_count = self.limits.max_write_count;
        let write_count = self.integer(
            |v| v > 0 && (v as u64) < max_count as u64,
            &format!("WCOUNT must be in 1..{max_count}"),
        )?;
        Ok(PipeSpec {
            pipe_size: to_usize(pipe_size),
            read_count: to_usize(read_count),
            write_count: to_usize(write_count),
        })
    }

    fn buffer_size(&mut self) -> Result<usize> {
        let max_size = self.limits.max_buffer_size;
        let size = self.integer(
            |v| v > 1 && (v as u64) < max_size as u64,
            &format!("BUFSIZE must be in 2..{max_size}"),
        )?;
        Ok(to_usize(size))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.args.len()
    }

    /// Classify the next word without consuming it.
    fn peek(&self) -> Result<Option<Token>> {
        let Some(word) = self.args.get(self.pos) else {
            return Ok(None);
        };
        Token::classify(word.as_ref())
            .map(Some)
            .map_err(|err| self.diverged(err.reason()))
    }

    fn accept(&mut self, token: Token) {
        self.tokens.push(token);
        self.pos += 1;
    }

    fn keyword(&mut self, expected: Identifier) -> Result<()> {
        self.one_of(&[expected]).map(|_| ())
    }

    fn one_of(&mut self, allowed: &[Identifier]) -> Result<Identifier> {
        match self.peek()? {
            Some(token @ Token::Identifier(ident)) if allowed.contains(&ident) => {
                self.accept(token);
                Ok(ident)
            }
            _ => {
                let names: Vec<&str> = allowed.iter().map(|ident| ident.as_str()).collect();
                Err(self.diverged(&format!("expected {}", names.join("|"))))
            }
        }
    }

    fn integer(&mut self, valid: impl Fn(i64) -> bool, rule: &str) -> Result<i64> {
        match self.peek()? {
            Some(token @ Token::Integer(value)) if valid(value) => {
                self.accept(token);
                Ok(value)
            }
            _ => Err(self.diverged(rule)),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.diverged("unexpected trailing token"))
        }
    }

    fn diverged(&self, reason: &str) -> GrammarError {
        let consumed: Vec<&str> = self.args[..self.pos].iter().map(|word| word.as_ref()).collect();
        GrammarError::Diverged {
            command: self.kind,
            consumed: consumed.join(" "),
            found: self.args.get(self.pos).map(|word| word.as_ref().to_string()),
            reason: reason.to_string(),
        }
    }
}

// Callers only pass values that already passed a `>= 0` check.
fn to_usize(value: i64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
