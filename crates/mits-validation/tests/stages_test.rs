use mits_catalog::{CatalogLoader, CatalogState};
use mits_findings::{Finding, Severity, codes};
use mits_schema::{ArtifactCache, RuleSet, RulesLayout, XsdSchema};
use mits_validation::{BusinessRuleStage, SchemaStage, SemanticStage, Stage, StageInput, WellFormedStage};

const RULES_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../rules");
const VERSION: &str = "mits-5.0";

fn layout() -> RulesLayout {
    RulesLayout::new(RULES_ROOT, VERSION)
}

fn feed(classification: &str, requirement: &str, frequency: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<PropertyMarketing xmlns="http://www.mits.org/schema/PropertyMarketing/ILS/5.0" version="5.0" timestamp="2024-01-15T10:30:00Z">
  <Property>
    <PropertyID>PROP-001</PropertyID>
    <PropertyName>Sunset Apartments</PropertyName>
    <PropertyType>Apartment</PropertyType>
    <Address>
      <StreetAddress>123 Main St</StreetAddress>
      <City>Anytown</City>
      <State>CA</State>
      <PostalCode>90210</PostalCode>
    </Address>
    <ChargeOffer>
      <ChargeOfferItem>
        <ChargeClassification>{classification}</ChargeClassification>
        <Requirement>{requirement}</Requirement>
        <PaymentFrequency>{frequency}</PaymentFrequency>
        <Refundability>NonRefundable</Refundability>
        <TermBasis>LeaseTerm</TermBasis>
        <Amount>1500.00</Amount>
        <Description>Monthly rent</Description>
      </ChargeOfferItem>
    </ChargeOffer>
  </Property>
</PropertyMarketing>"#
    )
}

/// Every stage wired to the shipped rules tree.
fn stages() -> Vec<Box<dyn Stage>> {
    let layout = layout();
    let (registry, catalog_findings) = CatalogLoader::new(layout.clone()).load();
    assert!(catalog_findings.is_empty(), "{catalog_findings:?}");
    vec![
        Box::new(WellFormedStage::new()),
        Box::new(SchemaStage::load(&layout, &ArtifactCache::<XsdSchema>::new())),
        Box::new(BusinessRuleStage::load(&layout, &ArtifactCache::<RuleSet>::new())),
        Box::new(SemanticStage::new(CatalogState::from(registry))),
    ]
}

fn run_all(xml: &str) -> Vec<(String, Vec<Finding>)> {
    let doc = mits_adapter_xml::parse(xml.as_bytes()).ok();
    let mut input = StageInput::new(xml.as_bytes()).with_content_type("application/xml");
    if let Some(doc) = doc.as_ref() {
        input = input.with_document(doc);
    }
    stages()
        .iter()
        .map(|stage| {
            let result = stage.run(&input).unwrap();
            (result.stage, result.findings)
        })
        .collect()
}

#[test]
fn test_valid_feed_is_clean_at_every_stage() {
    for (stage, findings) in run_all(&feed("Rent", "Mandatory", "Monthly")) {
        assert!(findings.is_empty(), "{stage}: {findings:?}");
    }
}

#[test]
fn test_stage_names() {
    let names: Vec<_> = run_all(&feed("Rent", "Mandatory", "Monthly"))
        .into_iter()
        .map(|(stage, _)| stage)
        .collect();
    assert_eq!(names, vec!["WellFormed", "XSD", "Schematron", "Semantic"]);
}

#[test]
fn test_unknown_charge_class_reported_once() {
    let results = run_all(&feed("PurpleMonkey", "Mandatory", "Monthly"));

    let all: Vec<&Finding> = results.iter().flat_map(|(_, f)| f).collect();
    assert_eq!(all.len(), 1, "{all:?}");

    let (stage, findings) = &results[3];
    assert_eq!(stage, "Semantic");
    let finding = &findings[0];
    assert_eq!(finding.code(), codes::SEMANTIC_INVALID_CHARGE_CLASS);
    assert_eq!(finding.severity(), Severity::Error);
    assert!(finding.message().contains("PurpleMonkey"));
    assert_eq!(finding.rule_reference(), "semantic://charge-classification");

    let location = finding.location().unwrap();
    assert_eq!(
        location.path.as_deref(),
        Some("/PropertyMarketing/Property/ChargeOffer/ChargeOfferItem/ChargeClassification")
    );
    assert_eq!(location.value.as_deref(), Some("PurpleMonkey"));
    assert_eq!(location.line, Some(15));
}

#[test]
fn test_aliases_and_codes_both_accepted() {
    for classification in ["RENT", "Rent", "BaseRent"] {
        let results = run_all(&feed(classification, "Mandatory", "Monthly"));
        assert!(results[3].1.is_empty(), "{classification}: {:?}", results[3].1);
    }
}

#[test]
fn test_advisory_heuristics() {
    let rent = run_all(&feed("Rent", "Optional", "Monthly"));
    let codes_found: Vec<_> = rent[3].1.iter().map(Finding::code).collect();
    assert_eq!(codes_found, vec![codes::SEMANTIC_INCONSISTENT_RENT_REQUIREMENT]);
    assert_eq!(rent[3].1[0].severity(), Severity::Warning);

    let deposit = run_all(&feed("Deposit", "Mandatory", "Monthly"));
    let codes_found: Vec<_> = deposit[3].1.iter().map(Finding::code).collect();
    assert_eq!(codes_found, vec![codes::SEMANTIC_INCONSISTENT_DEPOSIT_FREQUENCY]);

    let one_time = run_all(&feed("Deposit", "Mandatory", "OneTime"));
    assert!(one_time[3].1.is_empty());
}

#[test]
fn test_invalid_enum_values() {
    let results = run_all(&feed("Rent", "Mandatory", "Fortnightly"));
    let semantic = &results[3].1;
    assert_eq!(semantic.len(), 1);
    assert_eq!(semantic[0].code(), codes::SEMANTIC_INVALID_PAYMENT_FREQUENCY);
    assert_eq!(semantic[0].rule_reference(), "semantic://payment-frequency");
}

#[test]
fn test_schema_violation_reports_path() {
    let xml = feed("Rent", "Sometimes", "Monthly");
    let results = run_all(&xml);
    let (stage, findings) = &results[1];
    assert_eq!(stage, "XSD");
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].code(), codes::XSD_VALIDATION_ERROR);
    assert_eq!(
        findings[0].location().unwrap().path.as_deref(),
        Some("/PropertyMarketing/Property/ChargeOffer/ChargeOfferItem/Requirement")
    );
}

#[test]
fn test_business_rule_failure() {
    let xml = feed("Rent", "Mandatory", "Monthly").replace("1500.00", "-5");
    let results = run_all(&xml);
    let (stage, findings) = &results[2];
    assert_eq!(stage, "Schematron");
    assert_eq!(findings.len(), 1, "{findings:?}");
    assert_eq!(findings[0].code(), codes::SCHEMATRON_RULE_FAILURE);
    assert_eq!(findings[0].severity(), Severity::Error);
    assert_eq!(findings[0].rule_reference(), "schematron://CHG-AMOUNT-NONNEG");
}

#[test]
fn test_malformed_feed_stops_after_well_formedness() {
    let xml = feed("Rent", "Mandatory", "Monthly").replace("</Property>", "");
    let results = run_all(&xml);

    let (stage, findings) = &results[0];
    assert_eq!(stage, "WellFormed");
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].code(), codes::WELLFORMED_PARSE_ERROR);
    assert!(findings[0].location().unwrap().line.is_some());

    for (stage, findings) in &results[1..] {
        assert!(findings.is_empty(), "{stage}: {findings:?}");
    }
}

#[test]
fn test_missing_rule_files_degrade() {
    let dir = tempfile::TempDir::new().unwrap();
    let layout = RulesLayout::new(dir.path(), VERSION);
    let xml = feed("Rent", "Mandatory", "Monthly");
    let doc = mits_adapter_xml::parse(xml.as_bytes()).unwrap();
    let input = StageInput::new(xml.as_bytes()).with_document(&doc);

    let schema = SchemaStage::load(&layout, &ArtifactCache::new()).validate(&input).unwrap();
    assert_eq!(schema.len(), 1);
    assert_eq!(schema[0].code(), codes::XSD_SCHEMA_MISSING);
    assert_eq!(schema[0].severity(), Severity::Info);

    let rules = BusinessRuleStage::load(&layout, &ArtifactCache::new()).validate(&input).unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].code(), codes::SCHEMATRON_NO_RULES_LOADED);
    assert!(rules.iter().all(|f| f.severity() == Severity::Info));
}
