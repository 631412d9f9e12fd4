//! Catalog cross-reference stage

use mits_catalog::{CatalogRegistry, CatalogState};
use mits_findings::{Finding, Location, codes};
use mits_ir::{NodeId, NodeRef, Traversal, XmlDocument, walk};
use tracing::{debug, trace};

use crate::Result;
use crate::stage::{Stage, StageInput, StageKind};

/// Controlled vocabulary a field is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vocabulary {
    ChargeClasses,
    /// Named enumeration (file stem under `catalogs/enums`)
    Enum(&'static str),
}

/// One business field and the catalog its values must come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldCheck {
    /// Element local name; matched regardless of prefix
    pub element: &'static str,
    pub vocabulary: Vocabulary,
    /// Code reported for values outside the vocabulary
    pub code: &'static str,
    /// Human label used in messages
    pub label: &'static str,
    /// `semantic://` rule reference suffix
    pub reference: &'static str,
}

/// Fields checked by default, in reporting order
pub const FIELD_CHECKS: [FieldCheck; 4] = [
    FieldCheck {
        element: "ChargeClassification",
        vocabulary: Vocabulary::ChargeClasses,
        code: codes::SEMANTIC_INVALID_CHARGE_CLASS,
        label: "Charge classification",
        reference: "charge-classification",
    },
    FieldCheck {
        element: "PaymentFrequency",
        vocabulary: Vocabulary::Enum("payment-frequency"),
        code: codes::SEMANTIC_INVALID_PAYMENT_FREQUENCY,
        label: "Payment frequency",
        reference: "payment-frequency",
    },
    FieldCheck {
        element: "Refundability",
        vocabulary: Vocabulary::Enum("refundability"),
        code: codes::SEMANTIC_INVALID_REFUNDABILITY,
        label: "Refundability",
        reference: "refundability",
    },
    FieldCheck {
        element: "TermBasis",
        vocabulary: Vocabulary::Enum("term-basis"),
        code: codes::SEMANTIC_INVALID_TERM_BASIS,
        label: "Term basis",
        reference: "term-basis",
    },
];

const CHARGE_ITEM: &str = "ChargeOfferItem";
const REQUIREMENT_ELEMENTS: [&str; 2] = ["ChargeRequirement", "Requirement"];
const RENT_CODE: &str = "RENT";
const DEPOSIT_VALUES: [&str; 2] = ["Deposit", "DEPOSIT"];
const ONE_TIME: &str = "OneTime";

impl FieldCheck {
    /// Whether `value` belongs to the field's vocabulary. `None` when the
    /// vocabulary was not loaded, in which case the field is not checked.
    fn accepts(&self, registry: &CatalogRegistry, value: &str) -> Option<bool> {
        match self.vocabulary {
            Vocabulary::ChargeClasses => registry
                .has_charge_classes()
                .then(|| registry.is_valid_charge_class(value)),
            Vocabulary::Enum(name) => registry
                .has_enum(name)
                .then(|| registry.enum_contains(name, value)),
        }
    }
}

/// Checks field values against the loaded catalogs, plus advisory
/// consistency heuristics over charge items
#[derive(Debug, Clone)]
pub struct SemanticStage {
    catalogs: CatalogState,
    fields: Vec<FieldCheck>,
}

impl SemanticStage {
    pub fn new(catalogs: CatalogState) -> Self {
        Self {
            catalogs,
            fields: FIELD_CHECKS.to_vec(),
        }
    }

    /// Replace the checked fields.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<FieldCheck>) -> Self {
        self.fields = fields;
        self
    }

    #[must_use]
    pub fn catalogs(&self) -> &CatalogState {
        &self.catalogs
    }

    fn field_findings(&self, registry: &CatalogRegistry, document: &XmlDocument) -> Vec<Finding> {
        let Some(root) = document.root() else {
            return Vec::new();
        };
        let mut collector = FieldCollector::new(&self.fields);
        walk(root, &mut collector);

        let mut findings = Vec::new();
        for (field, occurrences) in self.fields.iter().zip(collector.found) {
            for node in occurrences.into_iter().map(|id| document.node(id)) {
                let value = node.text();
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                match field.accepts(registry, value) {
                    Some(true) => {}
                    Some(false) => findings.push(
                        Finding::new(
                            field.code,
                            format!("{} '{value}' is not valid according to catalog", field.label),
                        )
                        .with_location(node_location(node).with_value(value))
                        .with_rule_reference(format!("semantic://{}", field.reference)),
                    ),
                    None => {
                        trace!(field = field.element, "vocabulary not loaded; field skipped");
                        break;
                    }
                }
            }
        }
        findings
    }
}

impl Stage for SemanticStage {
    fn kind(&self) -> StageKind {
        StageKind::Semantic
    }

    fn validate(&self, input: &StageInput<'_>) -> Result<Vec<Finding>> {
        let registry = match &self.catalogs {
            CatalogState::Loaded(registry) => registry,
            CatalogState::Failed(reason) => {
                debug!(reason = reason.as_str(), "catalogs unavailable; semantic checks skipped");
                return Ok(vec![Finding::new(
                    codes::ENGINE_RESOURCE_LOAD_FAILED,
                    format!("Failed to load catalogs for semantic validation: {reason}"),
                )]);
            }
        };
        let Some(document) = input.document else {
            return Ok(Vec::new());
        };

        let mut findings = self.field_findings(registry, document);
        findings.extend(consistency_findings(registry, document));
        Ok(findings)
    }
}

/// Collects field elements in document order, one list per field
struct FieldCollector<'f> {
    fields: &'f [FieldCheck],
    found: Vec<Vec<NodeId>>,
}

impl<'f> FieldCollector<'f> {
    fn new(fields: &'f [FieldCheck]) -> Self {
        Self {
            fields,
            found: vec![Vec::new(); fields.len()],
        }
    }
}

impl Traversal for FieldCollector<'_> {
    fn visit(&mut self, node: NodeRef<'_>, _path: &[String]) {
        let Some(name) = node.local_name() else {
            return;
        };
        if let Some(idx) = self.fields.iter().position(|f| f.element == name) {
            self.found[idx].push(node.id());
        }
    }
}

/// Advisory warnings over each charge item.
fn consistency_findings(registry: &CatalogRegistry, document: &XmlDocument) -> Vec<Finding> {
    let mut findings = Vec::new();
    for item in document.descendants_by_local_name(CHARGE_ITEM) {
        let classification = descendant_value(item, &["ChargeClassification"]);
        let Some(classification) = classification.as_deref() else {
            continue;
        };

        let requirement = descendant_value(item, &REQUIREMENT_ELEMENTS);
        if is_rent(registry, classification) && requirement.as_deref() == Some("Optional") {
            findings.push(
                Finding::new(
                    codes::SEMANTIC_INCONSISTENT_RENT_REQUIREMENT,
                    "Rent charges should typically be Mandatory, not Optional",
                )
                .with_location(node_location(item).with_value(classification))
                .with_rule_reference("semantic://business-logic"),
            );
        }

        let frequency = descendant_value(item, &["PaymentFrequency"]);
        if DEPOSIT_VALUES.contains(&classification)
            && frequency.as_deref().is_some_and(|f| f != ONE_TIME)
        {
            findings.push(
                Finding::new(
                    codes::SEMANTIC_INCONSISTENT_DEPOSIT_FREQUENCY,
                    "Deposit charges should typically be OneTime payments",
                )
                .with_location(node_location(item).with_value(frequency.unwrap_or_default()))
                .with_rule_reference("semantic://business-logic"),
            );
        }
    }
    findings
}

fn is_rent(registry: &CatalogRegistry, classification: &str) -> bool {
    matches!(classification, "Rent" | "RENT")
        || registry
            .charge_class(RENT_CODE)
            .is_some_and(|rent| rent.accepts(classification))
}

/// Trimmed text of the first descendant with one of `names`.
fn descendant_value(item: NodeRef<'_>, names: &[&str]) -> Option<String> {
    item.descendants()
        .into_iter()
        .find(|n| n.local_name().is_some_and(|l| names.contains(&l)))
        .map(|n| n.text().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn node_location(node: NodeRef<'_>) -> Location {
    let position = node.position();
    let location = Location::path(node.path());
    if position.line > 0 {
        location.with_line_column(position.line, position.column)
    } else {
        location
    }
}
