//! Stage trait, kinds and per-run input

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use mits_findings::{Finding, StageResult};
use mits_ir::XmlDocument;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::{Result, StageError};

/// The fixed set of validation stages, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    WellFormed,
    /// XSD structure and simple values
    Schema,
    /// Schematron assertions
    BusinessRules,
    /// Catalog cross-reference
    Semantic,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::WellFormed,
        StageKind::Schema,
        StageKind::BusinessRules,
        StageKind::Semantic,
    ];

    /// Name used in profiles and envelopes.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            StageKind::WellFormed => "WellFormed",
            StageKind::Schema => "XSD",
            StageKind::BusinessRules => "Schematron",
            StageKind::Semantic => "Semantic",
        }
    }

    /// Parse a stage name, accepting the usual aliases case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<StageKind> {
        match name.trim().to_ascii_lowercase().as_str() {
            "wellformed" | "well-formed" | "well_formed" => Some(StageKind::WellFormed),
            "xsd" | "schema" => Some(StageKind::Schema),
            "schematron" | "businessrules" | "business-rules" | "business_rules" => {
                Some(StageKind::BusinessRules)
            }
            "semantic" => Some(StageKind::Semantic),
            _ => None,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StageKind {
    type Err = StageError;

    fn from_str(s: &str) -> Result<Self> {
        StageKind::from_name(s).ok_or_else(|| StageError::UnknownStage(s.to_string()))
    }
}

impl Serialize for StageKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

/// What a stage sees of the document being validated
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub bytes: &'a [u8],
    /// Declared content type, advisory only
    pub content_type: Option<&'a str>,
    /// Parsed tree, absent when the bytes are not well-formed
    pub document: Option<&'a XmlDocument>,
}

impl<'a> StageInput<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            content_type: None,
            document: None,
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: &'a str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    #[must_use]
    pub fn with_document(mut self, document: &'a XmlDocument) -> Self {
        self.document = Some(document);
        self
    }
}

/// One validation algorithm
///
/// Stages only read their input and their own compiled artifacts, so one
/// instance can serve concurrent runs.
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Findings for one document, in emission order.
    ///
    /// # Errors
    ///
    /// Returns [`StageError`] only for unexpected faults; expected problems
    /// (missing rules, bad documents) are findings.
    fn validate(&self, input: &StageInput<'_>) -> Result<Vec<Finding>>;

    /// Run the stage and time it.
    ///
    /// # Errors
    ///
    /// Propagates [`Stage::validate`] errors.
    fn run(&self, input: &StageInput<'_>) -> Result<StageResult> {
        let start = Instant::now();
        let findings = self.validate(input)?;
        let duration = start.elapsed();
        debug!(
            stage = self.kind().name(),
            findings = findings.len(),
            duration_us = duration.as_micros(),
            "stage finished"
        );
        Ok(StageResult::new(self.kind().name(), findings, duration))
    }
}
