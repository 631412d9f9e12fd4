#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-schema
//!
//! Compiled rule artifacts for the schema and business-rule stages.
//!
//! Rule files live in a versioned directory tree ([`RulesLayout`]). Loading
//! one yields an [`Availability`]: the compiled artifact, a marker that the
//! file does not exist, or the reason it failed to compile. Missing rule
//! files are an ordinary configuration, not an error. [`ArtifactCache`]
//! keeps compiled artifacts keyed by file identity and modification time so
//! repeated runs skip recompilation.

/// Available / missing / failed artifact states.
pub mod availability;
/// Compiled artifact cache keyed by file fingerprint.
pub mod cache;
/// Versioned rules directory layout.
pub mod layout;
/// Business-rule sets.
pub mod schematron;
/// Schema model and compiler.
pub mod xsd;

pub use availability::Availability;
pub use cache::{ArtifactCache, CacheStats, Fingerprint};
pub use layout::{DEFAULT_VERSION, RulesLayout};
pub use schematron::{Check, CheckKind, Pattern, Rule, RuleSet};
pub use xsd::XsdSchema;

use thiserror::Error;

/// Errors that can occur when compiling rule artifacts
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rule file is not well-formed: {0}")]
    Markup(#[from] mits_adapter_xml::Error),

    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    #[error("Invalid rule set: {message}")]
    InvalidRules { message: String },

    #[error("Invalid expression: {0}")]
    Expression(#[from] mits_ir::Error),
}

impl Error {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a schema compilation error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Build a rule-set compilation error.
    pub fn invalid_rules(message: impl Into<String>) -> Self {
        Self::InvalidRules {
            message: message.into(),
        }
    }
}

/// Crate-local result type for artifact compilation.
pub type Result<T> = std::result::Result<T, Error>;
