use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-open byte range `[start, end)` into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset of the first covered byte.
    pub start: usize,
    /// Byte offset one past the last covered byte.
    pub end: usize,
}

impl Span {
    /// Create a new span.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// A zero-width span at the given offset.
    pub fn point(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    /// Smallest span covering both `self` and `other`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Whether `other` lies entirely within `self`.
    pub fn encloses(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Length in bytes.
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the span covers no bytes.
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }
}

/// Source location information for error reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Optional file path
    pub file: Option<String>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed, counted in Unicode scalar values)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create a source location with file information
    pub fn with_file(file: String, line: usize, column: usize) -> Self {
        Self {
            file: Some(file),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Informational note.
    Info,
    /// Problem that does not prevent output generation.
    Warning,
    /// Problem that marks the compilation as failed.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single collected diagnostic.
///
/// Diagnostics are collected, not raised: every pass returns its tree plus
/// a list of these, and later passes keep running on the partial result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity of the problem.
    pub severity: Severity,
    /// Source file the problem was found in.
    pub file: String,
    /// 1-based line.
    pub line: usize,
    /// 1-based column in Unicode scalar values.
    pub column: usize,
    /// Human-readable message.
    pub message: String,
    /// Byte range the diagnostic covers.
    pub span: Span,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(
        file: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Error,
            file: file.into(),
            line,
            column,
            message: message.into(),
            span: Span::default(),
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(
        file: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            file: file.into(),
            line,
            column,
            message: message.into(),
            span: Span::default(),
        }
    }

    /// Attach a byte span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Error => write!(
                f,
                "[{}:{}:{}] {}",
                self.file, self.line, self.column, self.message
            ),
            _ => write!(
                f,
                "{} at {}:{}:{}: {}",
                self.severity, self.file, self.line, self.column, self.message
            ),
        }
    }
}

/// Ordered collection of diagnostics produced by a pass.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create a new empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Append an error with location.
    pub fn error_at(
        &mut self,
        file: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) {
        self.entries
            .push(Diagnostic::error(file, line, column, message));
    }

    /// Append a warning with location.
    pub fn warning_at(
        &mut self,
        file: impl Into<String>,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) {
        self.entries
            .push(Diagnostic::warning(file, line, column, message));
    }

    /// Absorb all entries of another collection, preserving order.
    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    /// Whether any entry has `Error` severity.
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|d| d.severity == Severity::Error)
    }

    /// Whether the collection holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of `Error`-severity entries.
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    /// Iterate over the entries in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// Consume the collection, returning the underlying vector.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<T: IntoIterator<Item = Diagnostic>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Fatal compiler failures.
///
/// Almost everything is reported through [`Diagnostics`]; these variants
/// cover only the conditions no pass can recover from.
#[derive(Debug, Error)]
pub enum ChtlError {
    /// Input ended in the middle of a token.
    #[error("unexpected end of input at {location}: {message}")]
    UnexpectedEof {
        /// What was being scanned.
        message: String,
        /// Where the input ran out.
        location: SourceLocation,
    },
    /// An internal invariant was violated (unreachable state combination).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChtlError {
    /// Create an unexpected-eof error with location.
    pub fn unexpected_eof(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self::UnexpectedEof {
            message: message.into(),
            location: SourceLocation::new(line, column),
        }
    }
}
