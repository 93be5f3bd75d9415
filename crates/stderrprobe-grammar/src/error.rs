use crate::token::CommandKind;

/// Errors produced while validating a command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    /// The command line is empty.
    #[error("no command given")]
    MissingCommand,

    /// The first token does not name a command.
    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    /// The command line stopped matching the grammar of `command`.
    ///
    /// `consumed` is the accepted prefix of the line, `found` the offending
    /// token (`None` when the line ended early).
    #[error(
        "{consumed} ::error:: {reason} (found {})\n\noptions:\n\t{}",
        found_text(.found),
        synopsis_of(.command)
    )]
    Diverged {
        command: CommandKind,
        consumed: String,
        found: Option<String>,
        reason: String,
    },
}

impl GrammarError {
    /// The command whose grammar was being matched, if one was recognized.
    pub fn command(&self) -> Option<CommandKind> {
        match self {
            GrammarError::Diverged { command, .. } => Some(*command),
            _ => None,
        }
    }
}

fn found_text(found: &Option<String>) -> &str {
    found.as_deref().unwrap_or("end of input")
}

fn synopsis_of(command: &CommandKind) -> &'static str {
    command.synopsis()
}

pub type Result<T> = std::result::Result<T, GrammarError>;
