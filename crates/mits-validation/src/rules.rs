//! Business-rule stage
//!
//! Runs a compiled Schematron rule set. Within a pattern each context node
//! is handled by the first rule whose context selects it, so later rules in
//! the same pattern act as fallbacks.

use std::collections::HashSet;

use mits_findings::{Finding, Location, Severity, codes};
use mits_ir::{NodeId, NodeRef, XmlDocument};
use mits_schema::{ArtifactCache, Availability, Check, CheckKind, RuleSet, RulesLayout};
use tracing::{debug, trace, warn};

use crate::Result;
use crate::stage::{Stage, StageInput, StageKind};

/// Cross-field assertions from the version's rule file
#[derive(Debug, Clone)]
pub struct BusinessRuleStage {
    rules: Availability<RuleSet>,
}

impl BusinessRuleStage {
    pub fn new(rules: Availability<RuleSet>) -> Self {
        Self { rules }
    }

    /// Load the rule file of a rules version through a shared cache.
    pub fn load(layout: &RulesLayout, cache: &ArtifactCache<RuleSet>) -> Self {
        let path = layout.schematron_file();
        let rules = cache.load(&path, RuleSet::compile);
        if let Some(reason) = rules.failure() {
            warn!(path = %path.display(), reason, "business rules failed to compile");
        }
        Self::new(rules)
    }

    #[must_use]
    pub fn rules(&self) -> &Availability<RuleSet> {
        &self.rules
    }
}

impl Stage for BusinessRuleStage {
    fn kind(&self) -> StageKind {
        StageKind::BusinessRules
    }

    fn validate(&self, input: &StageInput<'_>) -> Result<Vec<Finding>> {
        let rules = match &self.rules {
            Availability::Available(rules) => rules,
            Availability::Missing => {
                return Ok(vec![Finding::new(
                    codes::SCHEMATRON_NO_RULES_LOADED,
                    "No business rules installed for this catalog version; rule checks skipped",
                )]);
            }
            Availability::ParseFailed(reason) => {
                return Ok(vec![Finding::new(
                    codes::SCHEMATRON_RULES_PARSE_ERROR,
                    format!("Business rules could not be loaded: {reason}"),
                )]);
            }
        };
        let Some(document) = input.document else {
            debug!("no parsed document; rule checks skipped");
            return Ok(Vec::new());
        };
        Ok(evaluate(rules, document))
    }
}

fn evaluate(rules: &RuleSet, document: &XmlDocument) -> Vec<Finding> {
    let start = document.document_node();
    let mut findings = Vec::new();

    for pattern in &rules.patterns {
        let mut handled: HashSet<NodeId> = HashSet::new();
        for rule in &pattern.rules {
            let contexts = match rule.context.select(start, &rules.namespaces) {
                Ok(nodes) => nodes,
                Err(e) => {
                    findings.push(
                        Finding::new(
                            codes::SCHEMATRON_VALIDATION_ERROR,
                            format!("Rule context could not be evaluated: {e}"),
                        )
                        .with_location(Location::default().with_test(rule.context.source())),
                    );
                    continue;
                }
            };
            trace!(context = rule.context.source(), nodes = contexts.len(), "rule context selected");

            for node in contexts {
                if !handled.insert(node.id()) {
                    continue;
                }
                for check in &rule.checks {
                    if let Some(finding) = run_check(check, node, rules) {
                        findings.push(finding);
                    }
                }
            }
        }
    }

    debug!(
        patterns = rules.patterns.len(),
        findings = findings.len(),
        "business rules evaluated"
    );
    findings
}

fn run_check(check: &Check, node: NodeRef<'_>, rules: &RuleSet) -> Option<Finding> {
    let location = || {
        let position = node.position();
        let location = Location::path(node.path())
            .with_test(check.test.source())
            .with_rule_id(check.id.clone());
        if position.line > 0 {
            location.with_line_column(position.line, position.column)
        } else {
            location
        }
    };
    let reference = format!("schematron://{}", check.id);

    let outcome = match check.test.evaluate_bool(node, &rules.namespaces) {
        Ok(outcome) => outcome,
        Err(e) => {
            return Some(
                Finding::new(
                    codes::SCHEMATRON_VALIDATION_ERROR,
                    format!("Rule '{}' could not be evaluated: {e}", check.id),
                )
                .with_location(location())
                .with_rule_reference(reference),
            );
        }
    };
    if !check.fires(outcome) {
        return None;
    }

    let severity = match check.kind {
        CheckKind::Assert if check.is_warning() => Severity::Warning,
        CheckKind::Assert => Severity::Error,
        CheckKind::Report => Severity::Info,
    };
    let message = if check.message.is_empty() {
        format!("Business rule '{}' failed: {}", check.id, check.test.source())
    } else {
        check.message.clone()
    };
    Some(
        Finding::new(codes::SCHEMATRON_RULE_FAILURE, message)
            .with_severity(severity)
            .with_location(location())
            .with_rule_reference(reference),
    )
}
