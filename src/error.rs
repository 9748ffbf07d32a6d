//! Macro error types

use crate::token::Position;

/// Errors raised while declaring or expanding macros.
///
/// A rule failing to match is not an error; only the failures below abort
/// expansion of the enclosing source unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacroError {
    /// A capture name appears twice in one matcher
    #[error("{position}: duplicate capture variable `${name}`")]
    DuplicateCapture { name: String, position: Position },

    /// Union variants bind different capture sets
    #[error("{position}: all union variants must bind the same captures at the same depth")]
    UnionCaptureMismatch { position: Position },

    /// A capture is substituted where it would still be repeating
    #[error(
        "{position}: capture `${name}` repeats at depth {declared} but is used at depth {used}"
    )]
    CaptureDepth {
        name: String,
        declared: usize,
        used: usize,
        position: Position,
    },

    /// A substitution refers to a capture the matcher never binds
    #[error("{position}: no capture variable named `${name}`")]
    UnknownCapture { name: String, position: Position },

    /// Malformed matcher, transcriber or declaration syntax
    #[error("{position}: {message}")]
    Syntax { message: String, position: Position },

    /// The source text could not be tokenized
    #[error("{position}: lex error: {message}")]
    Lex { message: String, position: Position },

    #[error("{position}: imbalanced delimiter: {message}")]
    ImbalancedDelimiter { message: String, position: Position },

    /// Repeating substitutions disagree on the iteration count, or none repeats
    #[error("{position}: {message}")]
    RepetitionCountMismatch { message: String, position: Position },

    #[error("{position}: cannot find macro `{name}`")]
    MacroNotFound { name: String, position: Position },

    /// No rule of the macro accepted the argument
    #[error("{position}: no rule of macro `{name}` matched `{argument}`")]
    UnmatchedInvocation {
        name: String,
        argument: String,
        position: Position,
    },

    #[error("{position}: macro expansion exceeded the limit of {limit} splices")]
    RecursionLimit { limit: usize, position: Position },

    #[error("{position}: importing `{module}`: {message}")]
    Import {
        module: String,
        message: String,
        position: Position,
    },
}

impl MacroError {
    /// Where the error was detected.
    pub fn position(&self) -> Position {
        match self {
            Self::DuplicateCapture { position, .. }
            | Self::UnionCaptureMismatch { position }
            | Self::CaptureDepth { position, .. }
            | Self::UnknownCapture { position, .. }
            | Self::Syntax { position, .. }
            | Self::Lex { position, .. }
            | Self::ImbalancedDelimiter { position, .. }
            | Self::RepetitionCountMismatch { position, .. }
            | Self::MacroNotFound { position, .. }
            | Self::UnmatchedInvocation { position, .. }
            | Self::RecursionLimit { position, .. }
            | Self::Import { position, .. } => *position,
        }
    }

    /// True for errors detected while a declaration is validated, before any
    /// rule of it is tried.
    pub fn is_declaration_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateCapture { .. }
                | Self::UnionCaptureMismatch { .. }
                | Self::CaptureDepth { .. }
                | Self::UnknownCapture { .. }
                | Self::Syntax { .. }
        )
    }

    pub(crate) fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }
}

pub type Result<T, E = MacroError> = std::result::Result<T, E>;
