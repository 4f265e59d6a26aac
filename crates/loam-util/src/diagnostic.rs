//! Diagnostic reporting for compile-time errors.
//!
//! Compile errors are printed to stderr as they are discovered, in the
//! interpreter's traditional format:
//!
//! ```text
//! [line 3] Error at '}': Expected expression.
//! [line 7] Error at end: Expected ';' after value.
//! [line 9] Error: Unterminated string.
//! ```
//!
//! The third form (no location) is used for error tokens coming out of the
//! lexer, whose lexeme is already the message. The handler keeps every
//! reported diagnostic so tests can assert on exact text without capturing
//! stderr.

use std::fmt;

/// Where in the source a diagnostic points.
///
/// Tokens carry a line number and a lexeme; a diagnostic either quotes the
/// lexeme, points at end of input, or (for lexer error tokens) carries no
/// location at all.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenLocation {
    /// Quote the offending lexeme: `Error at 'lexeme':`.
    Lexeme(String),
    /// The EOF token: `Error at end:`.
    End,
    /// No location fragment; used for lexer error tokens.
    None,
}

/// A single reported compile error.
///
/// # Example
///
/// ```
/// use loam_util::{Diagnostic, TokenLocation};
///
/// let diag = Diagnostic::new(3, TokenLocation::Lexeme("}".to_string()),
///                            "Expected expression.");
/// assert_eq!(diag.to_string(), "[line 3] Error at '}': Expected expression.");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// Source line (1-based).
    pub line: u32,
    /// Location fragment.
    pub location: TokenLocation,
    /// The message body.
    pub message: String,
}

impl Diagnostic {
    /// Creates a diagnostic for the given line, location, and message.
    pub fn new(line: u32, location: TokenLocation, message: impl Into<String>) -> Self {
        Self {
            line,
            location,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            TokenLocation::Lexeme(lexeme) => write!(f, " at '{lexeme}'")?,
            TokenLocation::End => write!(f, " at end")?,
            TokenLocation::None => {}
        }
        write!(f, ": {}", self.message)
    }
}

/// Collects and prints compile errors.
///
/// The handler prints each diagnostic to stderr immediately (the REPL shows
/// errors as the user types) and remembers it for later inspection. The
/// parser consults [`Handler::has_errors`] to decide whether compilation
/// produced a usable function.
///
/// # Example
///
/// ```
/// use loam_util::{Handler, TokenLocation};
///
/// let mut handler = Handler::new();
/// assert!(!handler.has_errors());
///
/// handler.report(1, TokenLocation::End, "Expected ';' after value.");
/// assert_eq!(handler.error_count(), 1);
/// ```
#[derive(Debug, Default)]
pub struct Handler {
    diagnostics: Vec<Diagnostic>,
}

impl Handler {
    /// Creates an empty handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports an error: prints it to stderr and records it.
    pub fn report(&mut self, line: u32, location: TokenLocation, message: impl Into<String>) {
        let diag = Diagnostic::new(line, location, message);
        eprintln!("{diag}");
        self.diagnostics.push(diag);
    }

    /// Returns true if any error has been reported.
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.diagnostics.len()
    }

    /// All diagnostics reported so far, in order.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}
