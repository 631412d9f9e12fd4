#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-validation
//!
//! The four validation stages run against a MITS feed:
//!
//! | Stage | Kind | Checks |
//! |---|---|---|
//! | [`WellFormedStage`] | `WellFormed` | the bytes parse as markup |
//! | [`SchemaStage`] | `XSD` | structure and simple values against the version's schema |
//! | [`BusinessRuleStage`] | `Schematron` | cross-field business assertions |
//! | [`SemanticStage`] | `Semantic` | field values against the controlled vocabularies |
//!
//! Every stage implements [`Stage`] and reports through
//! [`mits_findings::Finding`]. Missing rule files and catalogs are findings,
//! not errors; [`StageError`] is reserved for faults the orchestrator turns
//! into a crash finding.
//!
//! ```rust
//! use mits_validation::{Stage, StageInput, WellFormedStage};
//!
//! let input = StageInput::new(b"<PropertyMarketing/>").with_content_type("application/xml");
//! let result = WellFormedStage::new().run(&input).unwrap();
//! assert!(result.findings.is_empty());
//! ```

/// Business-rule stage.
pub mod rules;
/// Schema stage and content-model matching.
pub mod schema;
/// Catalog cross-reference stage.
pub mod semantic;
/// Stage trait, kinds and input.
pub mod stage;
/// Well-formedness stage.
pub mod wellformed;

pub use rules::BusinessRuleStage;
pub use schema::SchemaStage;
pub use semantic::{FIELD_CHECKS, FieldCheck, SemanticStage, Vocabulary};
pub use stage::{Stage, StageInput, StageKind};
pub use wellformed::WellFormedStage;

use thiserror::Error;

/// Unexpected stage failures
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{stage} stage failed: {message}")]
    Internal { stage: StageKind, message: String },

    #[error("Unknown stage name: {0}")]
    UnknownStage(String),
}

impl StageError {
    pub fn internal(stage: StageKind, message: impl Into<String>) -> Self {
        Self::Internal {
            stage,
            message: message.into(),
        }
    }
}

/// Result type for stage execution
pub type Result<T> = std::result::Result<T, StageError>;
