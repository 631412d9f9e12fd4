use std::sync::Arc;

use mits_findings::{Finding, Severity, codes};
use mits_pipeline::{
    ExecutionMode, IntakeLimits, InputSource, Orchestrator, OrchestratorConfig, Profile, ResultEnvelope,
    ValidationInput,
};
use mits_validation::{Stage, StageError, StageInput, StageKind};

const RULES_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../rules");

fn feed(classification: &str, requirement: &str, amount: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<PropertyMarketing xmlns="http://www.mits.org/schema/PropertyMarketing/ILS/5.0" version="5.0">
  <Property>
    <PropertyID>PROP-001</PropertyID>
    <PropertyName>Sunset Apartments</PropertyName>
    <ChargeOffer>
      <ChargeOfferItem>
        <ChargeClassification>{classification}</ChargeClassification>
        <Requirement>{requirement}</Requirement>
        <PaymentFrequency>Monthly</PaymentFrequency>
        <Amount>{amount}</Amount>
      </ChargeOfferItem>
    </ChargeOffer>
  </Property>
</PropertyMarketing>"#
    )
}

fn orchestrator() -> Orchestrator {
    Orchestrator::new(OrchestratorConfig::new(RULES_ROOT))
}

fn xml_input(xml: &str) -> ValidationInput {
    ValidationInput::new(xml).with_content_type("application/xml")
}

fn codes_of(envelope: &ResultEnvelope) -> Vec<&str> {
    envelope.findings.iter().map(Finding::code).collect()
}

fn assert_summary_consistent(envelope: &ResultEnvelope) {
    let errors = envelope.findings.iter().filter(|f| f.is_error()).count();
    let warnings = envelope
        .findings
        .iter()
        .filter(|f| f.severity() == Severity::Warning)
        .count();
    assert_eq!(envelope.summary.errors, errors);
    assert_eq!(envelope.summary.warnings, warnings);
    assert_eq!(envelope.summary.valid, errors == 0);
}

struct PanickingStage;

impl Stage for PanickingStage {
    fn kind(&self) -> StageKind {
        StageKind::Schema
    }

    fn validate(&self, _input: &StageInput<'_>) -> mits_validation::Result<Vec<Finding>> {
        panic!("schema compiler exploded")
    }
}

struct FailingStage;

impl Stage for FailingStage {
    fn kind(&self) -> StageKind {
        StageKind::BusinessRules
    }

    fn validate(&self, _input: &StageInput<'_>) -> mits_validation::Result<Vec<Finding>> {
        Err(StageError::internal(StageKind::BusinessRules, "rule index corrupted"))
    }
}

#[test]
fn test_clean_feed_is_valid() {
    let orchestrator = orchestrator();
    assert!(orchestrator.catalog_findings().is_empty(), "{:?}", orchestrator.catalog_findings());

    let envelope = orchestrator.validate(&xml_input(&feed("Rent", "Mandatory", "1500.00")), "default");
    assert!(envelope.findings.is_empty(), "{:?}", envelope.findings);
    assert!(envelope.is_valid());
    assert_eq!(envelope.validator.profile, "default");
    assert_eq!(envelope.validator.catalog_version, "mits-5.0");
    assert_eq!(
        envelope.validator.levels_executed,
        vec!["WellFormed", "XSD", "Schematron", "Semantic"]
    );
    assert_eq!(envelope.stages.len(), 4);
    assert_eq!(envelope.input.source, InputSource::Memory);
}

#[test]
fn test_unknown_charge_class() {
    let envelope = orchestrator().validate(&xml_input(&feed("PurpleMonkey", "Mandatory", "1500.00")), "default");

    assert_eq!(codes_of(&envelope), vec![codes::SEMANTIC_INVALID_CHARGE_CLASS]);
    assert!(!envelope.is_valid());
    assert_eq!(envelope.summary.errors, 1);
    assert_eq!(envelope.stages[3].name, "Semantic");
    assert_eq!(envelope.stages[3].errors, 1);
    assert_summary_consistent(&envelope);
}

#[test]
fn test_malformed_feed_reports_one_parse_error() {
    let xml = feed("Rent", "Mandatory", "1500.00").replace("</Property>", "");
    let envelope = orchestrator().validate(&xml_input(&xml), "default");

    assert_eq!(codes_of(&envelope), vec![codes::WELLFORMED_PARSE_ERROR]);
    assert!(!envelope.is_valid());
    assert_eq!(envelope.summary.errors, 1);
    // Later stages still run and report nothing for an unparsed document
    assert_eq!(envelope.stages.len(), 4);
}

#[test]
fn test_well_formed_only_profile() {
    let orchestrator = orchestrator();
    let profile = Profile::new("syntax", ["WellFormed"]);
    let xml = feed("PurpleMonkey", "Sometimes", "-5");
    let envelope = orchestrator.validate_with(&xml_input(&xml), &profile);

    assert_eq!(envelope.validator.levels_executed, vec!["WellFormed"]);
    assert!(envelope.findings.is_empty());
    assert!(envelope.is_valid());
}

#[test]
fn test_findings_follow_stage_order() {
    let xml = feed("PurpleMonkey", "Sometimes", "-5");
    let envelope = orchestrator().validate(&xml_input(&xml), "default");

    let stages_seen: Vec<&str> = envelope
        .findings
        .iter()
        .map(|f| match f.code().split(':').next() {
            Some("XSD") => "XSD",
            Some("SCHEMATRON") => "Schematron",
            Some("SEMANTIC") => "Semantic",
            other => panic!("unexpected category {other:?}"),
        })
        .collect();
    let mut sorted = stages_seen.clone();
    sorted.sort_by_key(|s| ["XSD", "Schematron", "Semantic"].iter().position(|n| n == s));
    assert_eq!(stages_seen, sorted);
    assert!(codes_of(&envelope).contains(&codes::XSD_VALIDATION_ERROR));
    assert!(codes_of(&envelope).contains(&codes::SCHEMATRON_RULE_FAILURE));
    assert!(codes_of(&envelope).contains(&codes::SEMANTIC_INVALID_CHARGE_CLASS));
    assert_summary_consistent(&envelope);
}

#[test]
fn test_crashing_stage_is_isolated() {
    let mut orchestrator = orchestrator();
    orchestrator.register(Arc::new(PanickingStage));
    orchestrator.register(Arc::new(FailingStage));

    let xml = feed("PurpleMonkey", "Mandatory", "1500.00");
    let envelope = orchestrator.validate(&xml_input(&xml), "default");

    let crashes: Vec<&Finding> = envelope
        .findings
        .iter()
        .filter(|f| f.code() == codes::ENGINE_LEVEL_CRASH)
        .collect();
    assert_eq!(crashes.len(), 2, "{:?}", envelope.findings);
    assert!(crashes[0].message().contains("Validation level XSD crashed"));
    assert!(crashes[0].message().contains("schema compiler exploded"));
    assert_eq!(crashes[0].rule_reference(), "internal://XSD");
    assert!(crashes[1].message().contains("rule index corrupted"));

    // Semantic still ran after the crashes
    assert!(codes_of(&envelope).contains(&codes::SEMANTIC_INVALID_CHARGE_CLASS));
    assert_eq!(
        envelope.validator.levels_executed,
        vec!["WellFormed", "XSD", "Schematron", "Semantic"]
    );
    assert_summary_consistent(&envelope);
}

#[test]
fn test_crash_isolated_in_parallel_mode() {
    let mut orchestrator =
        Orchestrator::new(OrchestratorConfig::new(RULES_ROOT).with_mode(ExecutionMode::Parallel));
    orchestrator.register(Arc::new(PanickingStage));

    let envelope = orchestrator.validate(&xml_input(&feed("Rent", "Mandatory", "1500.00")), "default");
    assert_eq!(codes_of(&envelope), vec![codes::ENGINE_LEVEL_CRASH]);
    assert_eq!(envelope.stages[1].name, "XSD");
}

#[test]
fn test_unregistered_and_unknown_levels() {
    let mut orchestrator = orchestrator();
    orchestrator.unregister(StageKind::BusinessRules);
    assert_eq!(orchestrator.levels_available(), vec!["WellFormed", "XSD", "Semantic"]);

    let profile = Profile::new("custom", ["WellFormed", "Schematron", "Spelling"]);
    let envelope = orchestrator.validate_with(&xml_input(&feed("Rent", "Mandatory", "1500.00")), &profile);

    assert_eq!(
        codes_of(&envelope),
        vec![codes::ENGINE_RULES_MISSING, codes::ENGINE_RULES_MISSING]
    );
    assert!(envelope.findings[1].message().contains("Spelling"));
    assert_eq!(envelope.validator.levels_executed, vec!["WellFormed"]);
    assert!(envelope.is_valid());
    assert_eq!(envelope.summary.warnings, 2);
}

#[test]
fn test_parallel_matches_sequential() {
    let sequential = orchestrator();
    let parallel = Orchestrator::new(OrchestratorConfig::new(RULES_ROOT).with_mode(ExecutionMode::Parallel));
    let xml = feed("PurpleMonkey", "Sometimes", "-5");

    let a = sequential.validate(&xml_input(&xml), "default");
    let b = parallel.validate(&xml_input(&xml), "default");
    assert_eq!(a.findings, b.findings);
    assert_eq!(a.validator.levels_executed, b.validator.levels_executed);
    assert_eq!(a.summary.errors, b.summary.errors);
}

#[test]
fn test_intake_rejection_runs_no_stage() {
    let orchestrator = orchestrator();
    let xml = feed("Rent", "Mandatory", "1500.00");

    let json = orchestrator.validate(&ValidationInput::new(xml.as_str()).with_content_type("application/json"), "default");
    assert_eq!(codes_of(&json), vec![codes::INTAKE_UNACCEPTABLE_CONTENT_TYPE]);
    assert!(json.stages.is_empty());
    assert!(json.validator.levels_executed.is_empty());
    assert!(!json.is_valid());

    let tiny = Profile::default_profile().with_intake_limits(IntakeLimits {
        max_bytes: Some(64),
        ..IntakeLimits::default()
    });
    let large = orchestrator.validate_with(&xml_input(&xml), &tiny);
    assert_eq!(codes_of(&large), vec![codes::INTAKE_TOO_LARGE]);
    assert_eq!(large.input.size_bytes, xml.len() as u64);
    assert!(large.stages.is_empty());
}

#[test]
fn test_downgraded_intake_finding_still_validates() {
    let orchestrator = orchestrator();
    let xml = feed("Rent", "Mandatory", "1500.00");
    let lenient = Profile::default_profile()
        .with_intake_limits(IntakeLimits {
            max_bytes: Some(3),
            ..IntakeLimits::default()
        })
        .with_override(codes::INTAKE_TOO_LARGE, Severity::Warning);

    let envelope = orchestrator.validate_with(&xml_input(&xml), &lenient);
    assert_eq!(codes_of(&envelope), vec![codes::INTAKE_TOO_LARGE]);
    assert_eq!(envelope.findings[0].severity(), Severity::Warning);
    assert_eq!(envelope.validator.levels_executed.len(), 4);
    assert_eq!(envelope.stages.len(), 4);
    assert_eq!(envelope.summary.warnings, 1);
    assert!(envelope.is_valid());
    assert_summary_consistent(&envelope);

    let broken = orchestrator.validate_with(&xml_input("<PropertyMarketing>"), &lenient);
    assert_eq!(codes_of(&broken)[0], codes::INTAKE_TOO_LARGE);
    assert!(codes_of(&broken).contains(&codes::WELLFORMED_PARSE_ERROR));
    assert!(!broken.is_valid());
}

#[test]
fn test_profile_overrides_from_yaml() {
    let orchestrator = orchestrator();
    let xml = feed("Rent", "Optional", "1500.00");

    let default = orchestrator.validate(&xml_input(&xml), "default");
    assert_eq!(codes_of(&default), vec![codes::SEMANTIC_INCONSISTENT_RENT_REQUIREMENT]);
    assert_eq!(default.findings[0].severity(), Severity::Warning);
    assert!(default.is_valid());

    let pms = orchestrator.validate(&xml_input(&xml), "PMS");
    assert_eq!(pms.validator.profile, "pms");
    assert_eq!(pms.validator.levels_executed, vec!["WellFormed", "XSD", "Semantic"]);
    assert_eq!(pms.findings[0].severity(), Severity::Error);
    assert!(!pms.is_valid());
    assert_summary_consistent(&pms);
}

#[test]
fn test_unknown_profile_falls_back_to_default() {
    let envelope = orchestrator().validate(&xml_input(&feed("Rent", "Mandatory", "1500.00")), "no-such-profile");
    assert_eq!(envelope.validator.profile, "default");
    assert_eq!(envelope.validator.levels_executed.len(), 4);
}

#[test]
fn test_missing_rules_version_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(OrchestratorConfig::new(dir.path()).with_version("mits-9.9"));
    assert!(!orchestrator.catalogs().is_loaded());
    assert!(
        orchestrator
            .catalog_findings()
            .iter()
            .any(|f| f.code() == codes::CATALOG_VERSION_NOT_FOUND)
    );

    let envelope = orchestrator.validate(&xml_input(&feed("PurpleMonkey", "Mandatory", "1500.00")), "default");
    assert_eq!(
        codes_of(&envelope),
        vec![
            codes::XSD_SCHEMA_MISSING,
            codes::SCHEMATRON_NO_RULES_LOADED,
            codes::ENGINE_RESOURCE_LOAD_FAILED,
        ]
    );
    assert!(envelope.is_valid());
    assert_eq!(envelope.validator.catalog_version, "mits-9.9");
}

#[test]
fn test_envelope_serializes() {
    let envelope = orchestrator().validate(
        &xml_input(&feed("PurpleMonkey", "Mandatory", "1500.00")).with_filename("feed.xml"),
        "default",
    );
    let json = serde_json::to_value(&envelope).unwrap();
    assert_eq!(json["input"]["source"], "file");
    assert_eq!(json["input"]["filename"], "feed.xml");
    assert_eq!(json["summary"]["valid"], false);
    assert_eq!(json["findings"][0]["code"], codes::SEMANTIC_INVALID_CHARGE_CLASS);
    assert_eq!(json["findings"][0]["severity"], "error");
}
