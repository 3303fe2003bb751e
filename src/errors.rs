// File: src/errors.rs
//
// Error handling and reporting for the Refl interpreter.
// Provides the panic type (the interpreter-fatal failure) with source
// location information and a pretty-printed report for the CLI.
//
// Recoverable failures are not errors at all: they are ordinary
// `UserError` values (see interpreter/value.rs) that scripts inspect.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Source location information for tracking where code appears in a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0 }
    }

    pub fn is_unknown(&self) -> bool {
        self.line == 0 && self.column == 0
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Categories of interpreter panics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RuntimeError,
    TypeError,
    DivisionByZero,
    NotCallable,
    NotIndexable,
    NotIterable,
    InvalidAssignment,
    ArgumentError,
    Cancelled,
    EventLoop,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::RuntimeError => write!(f, "Runtime Error"),
            ErrorKind::TypeError => write!(f, "Type Error"),
            ErrorKind::DivisionByZero => write!(f, "Division By Zero"),
            ErrorKind::NotCallable => write!(f, "Not Callable"),
            ErrorKind::NotIndexable => write!(f, "Not Indexable"),
            ErrorKind::NotIterable => write!(f, "Not Iterable"),
            ErrorKind::InvalidAssignment => write!(f, "Invalid Assignment"),
            ErrorKind::ArgumentError => write!(f, "Argument Error"),
            ErrorKind::Cancelled => write!(f, "Cancelled"),
            ErrorKind::EventLoop => write!(f, "Event Loop Error"),
        }
    }
}

/// An interpreter-fatal failure.
///
/// A panic aborts the current evaluation chain up to the nearest boundary:
/// the top-level `Interpreter::run` call, or the event loop's per-task
/// recovery. Operations below the evaluator create panics without a
/// position; the evaluator stamps the location of the node being evaluated
/// via [`Panic::at`].
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{}", render(.message, .location))]
pub struct Panic {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
}

fn render(message: &str, location: &SourceLocation) -> String {
    if location.is_unknown() {
        message.to_string()
    } else {
        format!("Panic at line {}, column {}: {}", location.line, location.column, message)
    }
}

impl Panic {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), location: SourceLocation::unknown() }
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RuntimeError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "context cancelled")
    }

    /// Attach a location unless the panic already carries one.
    ///
    /// The innermost location wins: a failure deep inside a function body
    /// keeps the position where it happened, not the call site.
    pub fn at(mut self, location: SourceLocation) -> Self {
        if self.location.is_unknown() {
            self.location = location;
        }
        self
    }

    /// Colored multi-line diagnostic used by the command-line runner
    pub fn report(&self) -> String {
        let mut out = String::new();
        let header = format!("{}", self.kind);
        out.push_str(&format!("{}: {}\n", header.red().bold(), self.message.bold()));
        if !self.location.is_unknown() {
            let arrow = format!("  --> {}", self.location);
            out.push_str(&format!("{}\n", arrow.bright_blue()));
        }
        out
    }
}
