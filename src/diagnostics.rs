//! Static-error diagnostics shared by the tree-walk parser/resolver and the bytecode compiler.
//!
//! Neither component prints anything itself. Instead they collect [Diagnostic]s and hand them back to the
//! caller, who formats and writes them. This keeps both pipelines testable without capturing
//! stderr.

use std::fmt;

/// Where a [Diagnostic] points, for the "at '<lexeme>'" / "at end" distinction.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    /// Points at a specific lexeme.
    Lexeme(String),
    /// Points at end-of-file.
    End,
    /// No specific lexeme (e.g. an unterminated string or unknown character).
    None,
}

/// A single static error: a lex, parse, or resolve failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: usize, location: Location, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            line,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    /// `[line N] Error<at '<lexeme>'|at end>: <message>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            Location::Lexeme(lexeme) => write!(f, " at '{lexeme}'")?,
            Location::End => write!(f, " at end")?,
            Location::None => {}
        }
        write!(f, ": {}", self.message)
    }
}
