#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-ir
//!
//! Markup document tree and query APIs for MITS property-marketing feeds.
//!
//! Documents are stored in an arena in document order: every node has a
//! stable [`NodeId`], parents are reachable from children, and comparing ids
//! gives document order. Parsing lives in `mits-adapter-xml`; this crate only
//! models the tree and answers questions about it.

/// Document container and builder.
pub mod document;
/// Source positions and declaration metadata.
pub mod metadata;
/// Node primitives: names, attributes, element data.
pub mod node;
/// Cursor-based traversal helpers and visitor walk.
pub mod traversal;
/// XPath 1.0 subset used by business-rule assertions.
pub mod xpath;

pub use document::{DocumentBuilder, NodeRef, XmlDocument};
pub use metadata::{Position, XmlDeclaration};
pub use node::{Attribute, ElementData, NodeId, NodeKind, QName};
pub use traversal::{Cursor, Traversal, node_path, walk};
pub use xpath::{Namespaces, XPath, XPathValue};

use thiserror::Error;

/// Errors that can occur when working with the document tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Node not found at path: {path}")]
    NodeNotFound { path: String },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("XPath syntax error in '{expr}' at offset {offset}: {message}")]
    XPathSyntax {
        expr: String,
        offset: usize,
        message: String,
    },

    #[error("XPath evaluation error in '{expr}': {message}")]
    XPathEval { expr: String, message: String },
}

impl Error {
    /// Build a node-not-found error with path context.
    pub fn node_not_found(path: impl Into<String>) -> Self {
        Self::NodeNotFound { path: path.into() }
    }

    /// Build an invalid-path error with input path and parsing reason.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Build an XPath syntax error at a byte offset of the expression.
    pub fn xpath_syntax(expr: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self::XPathSyntax {
            expr: expr.into(),
            offset,
            message: message.into(),
        }
    }

    /// Build an XPath evaluation error.
    pub fn xpath_eval(expr: impl Into<String>, message: impl Into<String>) -> Self {
        Self::XPathEval {
            expr: expr.into(),
            message: message.into(),
        }
    }
}

/// Crate-local result type for document operations.
pub type Result<T> = std::result::Result<T, Error>;
