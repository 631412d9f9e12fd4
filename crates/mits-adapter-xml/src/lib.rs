#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-adapter-xml
//!
//! Parses a byte buffer into an [`mits_ir::XmlDocument`], enforcing
//! well-formedness and namespace binding, and reporting the 1-based line and
//! column of the first problem.

pub mod parser;
pub mod syntax;

pub use parser::XmlParser;
pub use syntax::{LineIndex, NamespaceScope, is_markup_content_type, media_type};

use thiserror::Error;

/// Errors that can occur when parsing XML
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Parse error at line {line}, col {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Encoding error at line {line}, col {column}: {message}")]
    Encoding {
        line: usize,
        column: usize,
        message: String,
    },
}

impl Error {
    /// Build a parse error at a line/column.
    pub fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Line and column where the error was detected.
    #[must_use]
    pub fn line_column(&self) -> (usize, usize) {
        match self {
            Error::Parse { line, column, .. } | Error::Encoding { line, column, .. } => (*line, *column),
        }
    }

    /// Message without position prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Error::Parse { message, .. } | Error::Encoding { message, .. } => message,
        }
    }
}

/// Crate-local result type for parsing.
pub type Result<T> = std::result::Result<T, Error>;

/// Parse a complete document with default settings.
///
/// # Errors
///
/// Returns [`Error::Parse`] for malformed markup and [`Error::Encoding`]
/// for input that is not valid UTF-8.
pub fn parse(bytes: &[u8]) -> Result<mits_ir::XmlDocument> {
    XmlParser::new().parse(bytes)
}
