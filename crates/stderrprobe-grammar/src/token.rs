use std::fmt;
use std::num::IntErrorKind;

/// The closed vocabulary of words a command line may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Identifier {
    ToStderr,
    ToChildStderr,
    Pipe,
    PipeHandleToChild,
    ToHandle,
    PipeToChildStderr,
    SockToChildStderr,
    Write,
    WriteNl,
    PipeSize,
    Read,
    Unbuf,
    Lnbuf,
    Flbuf,
}

impl Identifier {
    /// Every identifier, commands first.
    pub const ALL: [Identifier; 14] = [
        Identifier::ToStderr,
        Identifier::ToChildStderr,
        Identifier::Pipe,
        Identifier::PipeHandleToChild,
        Identifier::ToHandle,
        Identifier::PipeToChildStderr,
        Identifier::SockToChildStderr,
        Identifier::Write,
        Identifier::WriteNl,
        Identifier::PipeSize,
        Identifier::Read,
        Identifier::Unbuf,
        Identifier::Lnbuf,
        Identifier::Flbuf,
    ];

    /// The exact spelling accepted on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Identifier::ToStderr => "to-stderr",
            Identifier::ToChildStderr => "to-child-stderr",
            Identifier::Pipe => "pipe",
            Identifier::PipeHandleToChild => "pipe-handle-to-child",
            Identifier::ToHandle => "to-handle",
            Identifier::PipeToChildStderr => "pipe-to-child-stderr",
            Identifier::SockToChildStderr => "sock-to-child-stderr",
            Identifier::Write => "write",
            Identifier::WriteNl => "write-nl",
            Identifier::PipeSize => "pipe-size",
            Identifier::Read => "read",
            Identifier::Unbuf => "unbuf",
            Identifier::Lnbuf => "lnbuf",
            Identifier::Flbuf => "flbuf",
        }
    }

    /// Case-sensitive lookup.
    pub fn lookup(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ident| ident.as_str() == word)
    }

    /// The command this identifier names, if it names one.
    pub fn command(self) -> Option<CommandKind> {
        match self {
            Identifier::ToStderr => Some(CommandKind::ToStderr),
            Identifier::ToChildStderr => Some(CommandKind::ToChildStderr),
            Identifier::Pipe => Some(CommandKind::Pipe),
            Identifier::PipeHandleToChild => Some(CommandKind::PipeHandleToChild),
            Identifier::ToHandle => Some(CommandKind::ToHandle),
            Identifier::PipeToChildStderr => Some(CommandKind::PipeToChildStderr),
            Identifier::SockToChildStderr => Some(CommandKind::SockToChildStderr),
            _ => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One word of a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Identifier(Identifier),
    Integer(i64),
}

/// Why a word could not be turned into a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    /// Neither a known identifier nor a base-10 integer.
    Unrecognized,
    /// A base-10 integer that does not fit in 64 bits.
    IntegerOutOfRange,
}

impl TokenError {
    pub fn reason(self) -> &'static str {
        match self {
            TokenError::Unrecognized => "unrecognized token",
            TokenError::IntegerOutOfRange => "integer out of range",
        }
    }
}

impl Token {
    /// Classify a raw command-line word.
    ///
    /// Identifiers are matched exactly; everything else must be a complete
    /// base-10 integer (`12abc` is rejected, not read as 12).
    pub fn classify(word: &str) -> Result<Token, TokenError> {
        if let Some(ident) = Identifier::lookup(word) {
            return Ok(Token::Identifier(ident));
        }
        match word.parse::<i64>() {
            Ok(value) => Ok(Token::Integer(value)),
            Err(err) => match err.kind() {
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                    Err(TokenError::IntegerOutOfRange)
                }
                _ => Err(TokenError::Unrecognized),
            },
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(ident) => ident.fmt(f),
            Token::Integer(value) => write!(f, "{value}"),
        }
    }
}

/// The commands a probe process can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ToStderr,
    ToChildStderr,
    Pipe,
    PipeHandleToChild,
    ToHandle,
    PipeToChildStderr,
    SockToChildStderr,
}

impl CommandKind {
    pub const ALL: [CommandKind; 7] = [
        CommandKind::ToStderr,
        CommandKind::ToChildStderr,
        CommandKind::Pipe,
        CommandKind::PipeHandleToChild,
        CommandKind::ToHandle,
        CommandKind::PipeToChildStderr,
        CommandKind::SockToChildStderr,
    ];

    pub fn identifier(self) -> Identifier {
        match self {
            CommandKind::ToStderr => Identifier::ToStderr,
            CommandKind::ToChildStderr => Identifier::ToChildStderr,
            CommandKind::Pipe => Identifier::Pipe,
            CommandKind::PipeHandleToChild => Identifier::PipeHandleToChild,
            CommandKind::ToHandle => Identifier::ToHandle,
            CommandKind::PipeToChildStderr => Identifier::PipeToChildStderr,
            CommandKind::SockToChildStderr => Identifier::SockToChildStderr,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.identifier().as_str()
    }

    /// One-line grammar of this command.
    pub fn synopsis(self) -> &'static str {
        match self {
            CommandKind::ToStderr => {
                "to-stderr (write|write-nl) COUNT [unbuf|(lnbuf|flbuf) BUFSIZE]"
            }
            CommandKind::ToChildStderr => {
                "to-child-stderr (write|write-nl) COUNT [unbuf|(lnbuf|flbuf) BUFSIZE]"
            }
            CommandKind::Pipe => "pipe pipe-size SIZE read RCOUNT write WCOUNT",
            CommandKind::PipeHandleToChild => {
                "pipe-handle-to-child pipe-size SIZE read RCOUNT write WCOUNT"
            }
            CommandKind::ToHandle => "to-handle HANDLE WRITE-COUNT",
            CommandKind::PipeToChildStderr => {
                "pipe-to-child-stderr pipe-size PSIZE read RCOUNT (write|write-nl) WCOUNT [unbuf|(lnbuf|flbuf) BSIZE]"
            }
            CommandKind::SockToChildStderr => {
                "sock-to-child-stderr read RCOUNT (write|write-nl) WCOUNT [unbuf|(lnbuf|flbuf) BSIZE]"
            }
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_round_trip_through_lookup() {
        for ident in Identifier::ALL {
            assert_eq!(Identifier::lookup(ident.as_str()), Some(ident));
        }
    }

    #[test]
    fn lookup_is_case_sensitive() {
        assert_eq!(Identifier::lookup("WRITE"), None);
        assert_eq!(Identifier::lookup(":write"), None);
    }

    #[test]
    fn classify_integers() {
        assert_eq!(Token::classify("0"), Ok(Token::Integer(0)));
        assert_eq!(Token::classify("4999"), Ok(Token::Integer(4999)));
        assert_eq!(Token::classify("-7"), Ok(Token::Integer(-7)));
    }

    #[test]
    fn classify_rejects_partial_integers() {
        assert_eq!(Token::classify("12abc"), Err(TokenError::Unrecognized));
        assert_eq!(Token::classify(""), Err(TokenError::Unrecognized));
        assert_eq!(Token::classify("1.5"), Err(TokenError::Unrecognized));
    }

    #[test]
    fn classify_rejects_oversized_integers() {
        assert_eq!(
            Token::classify("99999999999999999999"),
            Err(TokenError::IntegerOutOfRange)
        );
    }

    #[test]
    fn every_command_identifier_maps_to_its_kind() {
        for kind in CommandKind::ALL {
            assert_eq!(kind.identifier().command(), Some(kind));
        }
        assert_eq!(Identifier::Write.command(), None);
    }

    #[test]
    fn synopsis_starts_with_command_name() {
        for kind in CommandKind::ALL {
            assert!(kind.synopsis().starts_with(kind.as_str()));
        }
    }
}
