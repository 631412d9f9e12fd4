//! Result envelope: the serialized outcome of one validation run

use std::time::Duration;

use chrono::{DateTime, Utc};
use mits_findings::{Finding, SeverityCounts, StageResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope schema version
pub const API_VERSION: &str = "1.0";

/// Validator name reported in every envelope
pub const VALIDATOR_NAME: &str = "mits-validator";

/// Where the validated bytes came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    File,
    Url,
    Upload,
    Stdin,
    #[default]
    Memory,
}

/// Validator identity and the stages it ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorInfo {
    pub name: String,
    pub version: String,
    pub profile: String,
    pub catalog_version: String,
    pub levels_available: Vec<String>,
    pub levels_executed: Vec<String>,
}

impl ValidatorInfo {
    /// Identity with nothing executed yet.
    pub fn new(
        profile: impl Into<String>,
        catalog_version: impl Into<String>,
        levels_available: Vec<String>,
    ) -> Self {
        Self {
            name: VALIDATOR_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            profile: profile.into(),
            catalog_version: catalog_version.into(),
            levels_available,
            levels_executed: Vec::new(),
        }
    }
}

/// Description of the validated input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub source: InputSource,
    pub filename: Option<String>,
    pub url: Option<String>,
    pub size_bytes: u64,
    pub content_type: Option<String>,
}

/// Verdict and counts. `valid` is always `errors == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub valid: bool,
    pub errors: usize,
    pub warnings: usize,
    pub info: usize,
    pub duration_ms: u64,
}

impl Summary {
    /// Recompute the summary from a findings list.
    pub fn from_findings<'a>(findings: impl IntoIterator<Item = &'a Finding>, duration: Duration) -> Self {
        let counts = SeverityCounts::tally(findings);
        Self {
            valid: counts.errors == 0,
            errors: counts.errors,
            warnings: counts.warnings,
            info: counts.info,
            duration_ms: millis(duration),
        }
    }
}

/// Per-stage line in the envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub name: String,
    pub findings: usize,
    pub errors: usize,
    pub warnings: usize,
    pub duration_ms: u64,
}

impl From<&StageResult> for StageSummary {
    fn from(result: &StageResult) -> Self {
        let counts = result.counts();
        Self {
            name: result.stage.clone(),
            findings: result.findings.len(),
            errors: counts.errors,
            warnings: counts.warnings,
            duration_ms: millis(result.duration),
        }
    }
}

/// Per-run identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl RunMetadata {
    /// A fresh request id stamped now.
    #[must_use]
    pub fn fresh() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        }
    }
}

/// The aggregate output of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub api_version: String,
    pub validator: ValidatorInfo,
    pub input: InputDescriptor,
    pub summary: Summary,
    /// Every finding, in stage order then emission order
    pub findings: Vec<Finding>,
    pub stages: Vec<StageSummary>,
    pub metadata: RunMetadata,
}

impl ResultEnvelope {
    /// Assemble the envelope of a completed run. Only results of registered
    /// stages (those in `levels_available`) count as executed.
    #[must_use]
    pub fn from_stages(
        mut validator: ValidatorInfo,
        input: InputDescriptor,
        results: &[StageResult],
        duration: Duration,
    ) -> Self {
        let executed = results
            .iter()
            .filter(|r| validator.levels_available.contains(&r.stage))
            .map(|r| r.stage.clone())
            .collect();
        validator.levels_executed = executed;
        let findings: Vec<Finding> = results
            .iter()
            .flat_map(|r| r.findings.iter().cloned())
            .collect();
        Self {
            api_version: API_VERSION.to_string(),
            validator,
            input,
            summary: Summary::from_findings(&findings, duration),
            findings,
            stages: results.iter().map(StageSummary::from).collect(),
            metadata: RunMetadata::fresh(),
        }
    }

    /// Envelope for input that never reached a stage: an intake rejection
    /// or an acquisition failure reported with `INTAKE:*` / `NETWORK:*`
    /// codes.
    #[must_use]
    pub fn intake_failure(validator: ValidatorInfo, input: InputDescriptor, findings: Vec<Finding>) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            validator: ValidatorInfo {
                levels_executed: Vec::new(),
                ..validator
            },
            input,
            summary: Summary::from_findings(&findings, Duration::ZERO),
            findings,
            stages: Vec::new(),
            metadata: RunMetadata::fresh(),
        }
    }

    /// Put findings raised before any stage ran (intake findings a profile
    /// downgraded below error) ahead of the stage findings and recount.
    #[must_use]
    pub fn with_intake_findings(mut self, mut findings: Vec<Finding>) -> Self {
        if findings.is_empty() {
            return self;
        }
        findings.append(&mut self.findings);
        self.summary = Summary {
            duration_ms: self.summary.duration_ms,
            ..Summary::from_findings(&findings, Duration::ZERO)
        };
        self.findings = findings;
        self
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.summary.valid
    }

    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.metadata.request_id
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mits_findings::{Severity, codes};

    fn validator() -> ValidatorInfo {
        ValidatorInfo::new("default", "mits-5.0", vec!["WellFormed".into(), "XSD".into()])
    }

    #[test]
    fn test_findings_flattened_in_stage_order() {
        let results = vec![
            StageResult::new(
                "WellFormed",
                vec![Finding::new(codes::WELLFORMED_SUSPICIOUS_CONTENT_TYPE, "a")],
                Duration::from_millis(2),
            ),
            StageResult::new(
                "XSD",
                vec![
                    Finding::new(codes::XSD_VALIDATION_ERROR, "b"),
                    Finding::new(codes::XSD_VALIDATION_ERROR, "c"),
                ],
                Duration::from_millis(3),
            ),
        ];
        let envelope = ResultEnvelope::from_stages(
            validator(),
            InputDescriptor::default(),
            &results,
            Duration::from_millis(7),
        );

        let messages: Vec<_> = envelope.findings.iter().map(Finding::message).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        assert_eq!(envelope.validator.levels_executed, vec!["WellFormed", "XSD"]);
        assert_eq!(envelope.summary.errors, 2);
        assert_eq!(envelope.summary.warnings, 1);
        assert!(!envelope.summary.valid);
        assert_eq!(envelope.summary.duration_ms, 7);
        assert_eq!(envelope.stages[1].findings, 2);
        assert_eq!(envelope.stages[1].errors, 2);
    }

    #[test]
    fn test_unregistered_stage_not_executed() {
        let results = vec![
            StageResult::new("WellFormed", Vec::new(), Duration::ZERO),
            StageResult::new(
                "Spelling",
                vec![Finding::new(codes::ENGINE_RULES_MISSING, "Validation level Spelling not available")],
                Duration::ZERO,
            ),
        ];
        let envelope =
            ResultEnvelope::from_stages(validator(), InputDescriptor::default(), &results, Duration::ZERO);
        assert_eq!(envelope.validator.levels_executed, vec!["WellFormed"]);
        assert_eq!(envelope.stages.len(), 2);
        assert_eq!(envelope.summary.warnings, 1);
    }

    #[test]
    fn test_json_shape() {
        let envelope = ResultEnvelope::from_stages(
            validator(),
            InputDescriptor {
                source: InputSource::File,
                filename: Some("feed.xml".into()),
                size_bytes: 42,
                content_type: Some("application/xml".into()),
                ..InputDescriptor::default()
            },
            &[StageResult::new("WellFormed", Vec::new(), Duration::ZERO)],
            Duration::ZERO,
        );
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["api_version"], "1.0");
        assert_eq!(json["validator"]["name"], "mits-validator");
        assert_eq!(json["validator"]["catalog_version"], "mits-5.0");
        assert_eq!(json["input"]["source"], "file");
        assert_eq!(json["input"]["size_bytes"], 42);
        assert!(json["input"]["url"].is_null());
        assert_eq!(json["summary"]["valid"], true);
        assert_eq!(json["stages"][0]["name"], "WellFormed");
        assert_eq!(
            json["metadata"]["request_id"].as_str().unwrap(),
            envelope.request_id().to_string()
        );
        assert!(json["metadata"]["timestamp"].as_str().unwrap().contains('T'));

        let back: ResultEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_intake_failure() {
        let envelope = ResultEnvelope::intake_failure(
            validator(),
            InputDescriptor::default(),
            vec![Finding::new(codes::NETWORK_TIMEOUT, "fetch timed out")],
        );
        assert!(envelope.stages.is_empty());
        assert!(envelope.validator.levels_executed.is_empty());
        assert_eq!(envelope.summary.errors, 1);
        assert!(!envelope.is_valid());
        assert_eq!(envelope.findings[0].severity(), Severity::Error);
    }

    #[test]
    fn test_request_ids_are_fresh() {
        let a = RunMetadata::fresh();
        let b = RunMetadata::fresh();
        assert_ne!(a.request_id, b.request_id);
    }
}
