#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-findings
//!
//! Error-code catalog and finding model shared by every validation stage.
//!
//! Every defect or observation reported by the validator is a [`Finding`]
//! carrying a stable `CATEGORY:SUBCODE` code. The static table in [`codes`]
//! is the single source of truth for the default severity and the
//! human-facing wording of each code.
//!
//! ```rust
//! use mits_findings::{codes, Finding, Severity};
//!
//! let finding = Finding::new(codes::SEMANTIC_INVALID_CHARGE_CLASS, "bad class");
//! assert_eq!(finding.severity(), Severity::Error);
//! assert_eq!(finding.code(), "SEMANTIC:INVALID_CHARGE_CLASS");
//! ```

/// Static error-code catalog.
pub mod codes;
/// Finding, location and severity types.
pub mod finding;
/// Per-stage validation output.
pub mod result;

pub use codes::{Category, ErrorDefinition, definitions, lookup};
pub use finding::{Finding, Location, Severity};
pub use result::{SeverityCounts, StageResult};

use thiserror::Error;

/// Errors raised by the finding model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Unknown severity '{value}' (expected error, warning or info)")]
    UnknownSeverity { value: String },

    #[error("Unknown error category '{value}'")]
    UnknownCategory { value: String },

    #[error("Malformed finding code '{code}'")]
    MalformedCode { code: String },
}

impl Error {
    /// Build an unknown-severity error.
    pub fn unknown_severity(value: impl Into<String>) -> Self {
        Self::UnknownSeverity {
            value: value.into(),
        }
    }

    /// Build an unknown-category error.
    pub fn unknown_category(value: impl Into<String>) -> Self {
        Self::UnknownCategory {
            value: value.into(),
        }
    }
}

/// Crate-local result type for finding operations.
pub type Result<T> = std::result::Result<T, Error>;
