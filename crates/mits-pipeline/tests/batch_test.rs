use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mits_findings::{Finding, codes};
use mits_pipeline::{BatchConfig, BatchValidator, Orchestrator, OrchestratorConfig, ValidationInput};
use mits_validation::{Stage, StageInput, StageKind};

const RULES_ROOT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../rules");

fn feed(classification: &str) -> String {
    format!(
        r#"<PropertyMarketing xmlns="http://www.mits.org/schema/PropertyMarketing/ILS/5.0" version="5.0">
  <Property>
    <PropertyID>PROP-{classification}</PropertyID>
    <PropertyName>Harbor View</PropertyName>
    <ChargeOffer>
      <ChargeOfferItem>
        <ChargeClassification>{classification}</ChargeClassification>
        <Requirement>Mandatory</Requirement>
        <PaymentFrequency>Monthly</PaymentFrequency>
      </ChargeOfferItem>
    </ChargeOffer>
  </Property>
</PropertyMarketing>"#
    )
}

fn input(classification: &str) -> ValidationInput {
    ValidationInput::new(feed(classification))
        .with_content_type("text/xml")
        .with_filename(format!("{classification}.xml"))
}

struct SlowStage;

impl Stage for SlowStage {
    fn kind(&self) -> StageKind {
        StageKind::Semantic
    }

    fn validate(&self, _input: &StageInput<'_>) -> mits_validation::Result<Vec<Finding>> {
        std::thread::sleep(Duration::from_millis(300));
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct CountingStage {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl Stage for CountingStage {
    fn kind(&self) -> StageKind {
        StageKind::Semantic
    }

    fn validate(&self, _input: &StageInput<'_>) -> mits_validation::Result<Vec<Finding>> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(80));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_batch_preserves_input_order() {
    let orchestrator = Arc::new(Orchestrator::new(OrchestratorConfig::new(RULES_ROOT)));
    let batch = BatchValidator::new(
        orchestrator,
        BatchConfig {
            max_concurrency: 2,
            timeout: None,
        },
    );

    let inputs = vec![input("Rent"), input("PurpleMonkey"), input("Parking"), input("Unicorn")];
    let envelopes = batch.validate_all(inputs, "default").await;

    let filenames: Vec<_> = envelopes
        .iter()
        .map(|e| e.input.filename.clone().unwrap_or_default())
        .collect();
    assert_eq!(filenames, vec!["Rent.xml", "PurpleMonkey.xml", "Parking.xml", "Unicorn.xml"]);

    let verdicts: Vec<bool> = envelopes.iter().map(|e| e.summary.valid).collect();
    assert_eq!(verdicts, vec![true, false, true, false]);

    let ids: HashSet<_> = envelopes.iter().map(|e| e.request_id()).collect();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_validate_one_matches_direct_run() {
    let orchestrator = Arc::new(Orchestrator::new(OrchestratorConfig::new(RULES_ROOT)));
    let direct = orchestrator.validate(&input("PurpleMonkey"), "pms");
    let batch = BatchValidator::new(Arc::clone(&orchestrator), BatchConfig::default());
    let batched = batch.validate_one(input("PurpleMonkey"), "pms").await;

    assert_eq!(batched.findings, direct.findings);
    assert_eq!(batched.validator, direct.validator);
}

#[tokio::test]
async fn test_timeout_becomes_async_failure() {
    let mut orchestrator = Orchestrator::new(OrchestratorConfig::new(RULES_ROOT));
    orchestrator.register(Arc::new(SlowStage));
    let batch = BatchValidator::new(
        Arc::new(orchestrator),
        BatchConfig {
            max_concurrency: 1,
            timeout: Some(Duration::from_millis(20)),
        },
    );

    let envelope = batch.validate_one(input("Rent"), "default").await;
    assert_eq!(envelope.findings.len(), 1);
    assert_eq!(envelope.findings[0].code(), codes::ENGINE_ASYNC_VALIDATION_FAILED);
    assert!(envelope.findings[0].message().starts_with("Asynchronous validation failed"));
    assert!(!envelope.is_valid());
    assert!(envelope.stages.is_empty());
    assert_eq!(envelope.input.filename.as_deref(), Some("Rent.xml"));
}

#[tokio::test]
async fn test_timed_out_work_keeps_its_slot() {
    let stage = Arc::new(CountingStage::default());
    let mut orchestrator = Orchestrator::new(OrchestratorConfig::new(RULES_ROOT));
    orchestrator.register(Arc::clone(&stage) as Arc<dyn Stage>);
    let batch = BatchValidator::new(
        Arc::new(orchestrator),
        BatchConfig {
            max_concurrency: 1,
            timeout: Some(Duration::from_millis(10)),
        },
    );

    let envelopes = batch
        .validate_all(vec![input("Rent"), input("Deposit"), input("Parking")], "default")
        .await;
    assert!(
        envelopes
            .iter()
            .all(|e| e.findings[0].code() == codes::ENGINE_ASYNC_VALIDATION_FAILED)
    );
    assert_eq!(stage.peak.load(Ordering::SeqCst), 1);
}
