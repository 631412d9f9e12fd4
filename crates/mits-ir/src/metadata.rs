//! Metadata for tracking source positions
#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};

/// Source position information for error reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed, in characters)
    pub column: usize,

    /// Byte offset from start of input
    pub offset: usize,

    /// Length in bytes
    pub length: usize,
}

/// Contents of the `<?xml ...?>` declaration, when present
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlDeclaration {
    /// Declared XML version
    pub version: Option<String>,

    /// Declared encoding
    pub encoding: Option<String>,

    /// Declared standalone flag
    pub standalone: Option<String>,
}

impl Position {
    /// Create a new position
    #[must_use]
    pub fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_creation() {
        let pos = Position::new(10, 20, 100, 50);
        assert_eq!(pos.line, 10);
        assert_eq!(pos.column, 20);
        assert_eq!(pos.offset, 100);
        assert_eq!(pos.length, 50);
    }

    #[test]
    fn test_position_default() {
        let pos = Position::default();
        assert_eq!(pos.line, 0);
        assert_eq!(pos.column, 0);
    }

    #[test]
    fn test_declaration_default() {
        let decl = XmlDeclaration::default();
        assert!(decl.version.is_none());
        assert!(decl.encoding.is_none());
    }
}
