//! Per-stage validation output

use std::time::Duration;

use serde::Serialize;

use crate::finding::{Finding, Severity};

/// Output of one stage for one run. Built once, never mutated after return.
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    /// Stage name as reported in the envelope
    pub stage: String,
    /// Findings in emission order
    pub findings: Vec<Finding>,
    /// Wall-clock time spent in the stage
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

impl StageResult {
    #[must_use]
    pub fn new(stage: impl Into<String>, findings: Vec<Finding>, duration: Duration) -> Self {
        Self {
            stage: stage.into(),
            findings,
            duration,
        }
    }

    /// Severity tally of this stage's findings.
    #[must_use]
    pub fn counts(&self) -> SeverityCounts {
        SeverityCounts::tally(&self.findings)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(Finding::is_error)
    }
}

/// Finding counts per severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
}

impl SeverityCounts {
    /// Count findings by severity.
    pub fn tally<'a>(findings: impl IntoIterator<Item = &'a Finding>) -> Self {
        findings
            .into_iter()
            .fold(Self::default(), |mut acc, f| {
                match f.severity() {
                    Severity::Error => acc.errors += 1,
                    Severity::Warning => acc.warnings += 1,
                    Severity::Info => acc.info += 1,
                }
                acc
            })
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
