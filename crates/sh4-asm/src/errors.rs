//! Error reporting for the assembler and fixture runner.
//!
//! Every error formats in the usual compiler style:
//! ```text
//! add.s:10: error: unknown mnemonic: halt
//! ```

use std::fmt;
use std::path::PathBuf;

use crate::encoder::EncodeError;
use crate::parser::ParseErrorKind;
use crate::symbols::SymbolErrorKind;
use crate::test_format::AnnotationErrorKind;

/// A source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLoc {
    /// File path; empty for in-memory sources.
    pub file: PathBuf,
    /// 1-indexed line.
    pub line: usize,
}

impl SourceLoc {
    /// Creates a location.
    #[must_use]
    pub const fn new(file: PathBuf, line: usize) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.as_os_str().is_empty() {
            write!(f, "line {}", self.line)
        } else {
            write!(f, "{}:{}", self.file.display(), self.line)
        }
    }
}

/// Classification of assembler errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssembleErrorKind {
    /// Reading the source failed.
    Io(String),
    /// Line did not parse.
    Parse(ParseErrorKind),
    /// Label or address assignment failed.
    Symbol(SymbolErrorKind),
    /// Encoding failed.
    Encode(EncodeError),
    /// Fixture annotation did not parse.
    Annotation(AnnotationErrorKind),
}

impl fmt::Display for AssembleErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse(e) => write!(f, "{e}"),
            Self::Symbol(e) => write!(f, "{e}"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::Annotation(e) => write!(f, "{e}"),
        }
    }
}

/// An assembler error with its source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembleError {
    /// Kind of error.
    pub kind: AssembleErrorKind,
    /// Where it happened, when known.
    pub location: Option<SourceLoc>,
}

impl AssembleError {
    /// Error without a location.
    #[must_use]
    pub const fn new(kind: AssembleErrorKind) -> Self {
        Self {
            kind,
            location: None,
        }
    }

    /// Error at `line` of `file`.
    #[must_use]
    pub const fn at(kind: AssembleErrorKind, file: PathBuf, line: usize) -> Self {
        Self {
            kind,
            location: Some(SourceLoc::new(file, line)),
        }
    }

    /// Formats the error for stderr.
    #[must_use]
    pub fn format_for_stderr(&self) -> String {
        self.location.as_ref().map_or_else(
            || format!("error: {}", self.kind),
            |loc| format!("{loc}: error: {}", self.kind),
        )
    }
}

impl fmt::Display for AssembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{loc}: {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for AssembleError {}
