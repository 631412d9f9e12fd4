//! Finding model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codes::{self, Category};
use crate::{Error, Result};

/// Severity of a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Lowercase name as serialized.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warning" | "warn" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(Error::unknown_severity(s)),
        }
    }
}

/// Where in the document (or rule set) a finding applies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Line number (1-indexed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// Column number (1-indexed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<usize>,

    /// Path expression into the document, e.g. `/PropertyMarketing/Property[2]/PropertyID`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Offending value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Rule test expression that produced the finding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,

    /// Identifier of the rule or catalog file involved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}

impl Location {
    /// Location at a line/column pair.
    #[must_use]
    pub fn at(line: usize, column: usize) -> Self {
        Self {
            line: Some(line),
            column: Some(column),
            ..Self::default()
        }
    }

    /// Location identified by a path expression.
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_line_column(mut self, line: usize, column: usize) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    #[must_use]
    pub fn with_test(mut self, test: impl Into<String>) -> Self {
        self.test = Some(test.into());
        self
    }

    #[must_use]
    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }
}

/// One reported defect or observation.
///
/// Findings are immutable once built: the only later change allowed is a
/// severity remap through [`Finding::with_severity`], which leaves the code
/// and message untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    severity: Severity,
    code: String,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
    rule_reference: String,
}

impl Finding {
    /// Create a finding for a catalogued code using its default severity.
    ///
    /// Codes missing from the catalog are treated as errors.
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        let (severity, category) = match codes::lookup(code) {
            Some(def) => (def.severity, Some(def.category)),
            None => {
                warn!(code, "finding code is not in the error catalog");
                (Severity::Error, Category::of_code(code))
            }
        };
        let rule_reference = match category {
            Some(c) => format!("internal://{}", c.as_str().to_ascii_lowercase()),
            None => "internal://unknown".to_string(),
        };
        Self {
            severity,
            code: code.to_string(),
            message: message.into(),
            location: None,
            rule_reference,
        }
    }

    /// Create a finding whose message is the catalog description of `code`.
    pub fn from_code(code: &str) -> Self {
        let message = codes::lookup(code).map_or(code, |d| d.description);
        Self::new(code, message)
    }

    #[must_use]
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    #[must_use]
    pub fn with_rule_reference(mut self, rule_reference: impl Into<String>) -> Self {
        self.rule_reference = rule_reference.into();
        self
    }

    /// Same finding with a different severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    #[must_use]
    pub fn rule_reference(&self) -> &str {
        &self.rule_reference
    }

    /// Category derived from the code prefix.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        Category::of_code(&self.code)
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(loc) = &self.location {
            match (loc.line, loc.column) {
                (Some(line), Some(column)) => write!(f, " (line {line}, column {column})")?,
                (Some(line), None) => write!(f, " (line {line})")?,
                _ => {}
            }
            if let Some(path) = &loc.path {
                write!(f, " at {path}")?;
            }
        }
        Ok(())
    }
}
