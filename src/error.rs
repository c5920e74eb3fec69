//! Provides [InterpretationError], the error that most things return.
use std::fmt;

use thiserror::Error;

use crate::diagnostics::Diagnostic;

/// A single runtime fault: an operand-type mismatch, an undefined variable, an arity mismatch, a
/// non-callable call target, or a property access on a non-instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
    pub line: usize,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, line: usize) -> RuntimeError {
        RuntimeError {
            message: message.into(),
            line,
        }
    }
}

impl fmt::Display for RuntimeError {
    /// `<message>\n[line N]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n[line {}]", self.message, self.line)
    }
}

/// Any error that can occur during interpretation.
///
/// Static errors are collected en masse; a runtime fault aborts the current
/// execution, so there's only ever one.
#[derive(Debug, Error)]
pub enum InterpretationError {
    /// A compile-time error, such as a syntax error or a static resolution error.
    #[error("compile-time error ({} diagnostic(s))", .0.len())]
    CompileError(Vec<Diagnostic>),
    /// A runtime error, such as a type error or an undefined variable.
    #[error("runtime error: {0}")]
    RuntimeError(RuntimeError),
}

impl From<RuntimeError> for InterpretationError {
    fn from(e: RuntimeError) -> Self {
        InterpretationError::RuntimeError(e)
    }
}

impl From<Vec<Diagnostic>> for InterpretationError {
    fn from(diagnostics: Vec<Diagnostic>) -> Self {
        InterpretationError::CompileError(diagnostics)
    }
}
