//! Error types for the EU4 text tokenizer and parser.

use std::fmt;
use thiserror::Error;

/// A location in the source text.
///
/// `line` and `column` are 1-based and count characters, `offset` is the byte
/// offset into the decoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub(crate) fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Errors raised while splitting text into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    /// A character that can never start or continue a token.
    #[error("unexpected character {found:?} at {position}")]
    UnexpectedChar { found: char, position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedChar { position, .. } => *position,
        }
    }
}

/// Errors raised when the token stream does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// A token that is not allowed where it appeared.
    #[error("unexpected {found} at {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        position: Position,
    },
    /// `key =` followed by a closing brace or the end of input.
    #[error("missing value for '{key}' at {position}")]
    MissingValue { key: String, position: Position },
    /// A `{` that is never closed.
    #[error("block opened at {opened} is never closed")]
    UnterminatedBlock { opened: Position },
    /// A brace block containing both `key = value` pairs and bare values.
    #[error("unexpected {found} at {position}: block mixes assignments and bare values")]
    MixedBlock { found: String, position: Position },
    /// More braces open at once than the parser allows.
    #[error("blocks nested deeper than {limit} at {position}")]
    TooDeep { limit: usize, position: Position },
}

/// Any failure while reading or parsing a text file.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
