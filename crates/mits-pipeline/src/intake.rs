//! Intake checks run before any stage

use mits_findings::{Finding, Location, codes};
use tracing::debug;

use crate::profiles::IntakeLimits;

/// Findings for an input that the profile's intake limits reject. Empty
/// when the input may be validated.
#[must_use]
pub fn check_intake(limits: &IntakeLimits, size: u64, content_type: Option<&str>) -> Vec<Finding> {
    let mut findings = Vec::new();

    if !limits.allows_size(size) {
        let max = limits.max_bytes.unwrap_or_default();
        debug!(size, max, "input exceeds intake size limit");
        findings.push(Finding::new(
            codes::INTAKE_TOO_LARGE,
            format!("Input is {size} bytes; the profile accepts at most {max} bytes"),
        ));
    }

    if !limits.allows_content_type(content_type) {
        let declared = content_type.unwrap_or_default();
        let allowed = limits
            .allowed_content_types
            .as_deref()
            .unwrap_or_default()
            .join(", ");
        findings.push(
            Finding::new(
                codes::INTAKE_UNACCEPTABLE_CONTENT_TYPE,
                format!("Content type '{declared}' is not accepted (allowed: {allowed})"),
            )
            .with_location(Location::default().with_value(declared)),
        );
    }

    findings
}
