//! Business-rule sets in ISO Schematron syntax
//!
//! Only the parts needed for feed rules are understood: `ns`, `pattern`,
//! `rule`, `assert` and `report`. Every expression is compiled up front so a
//! broken rule file is rejected as a whole instead of failing half-way
//! through a run.

use mits_ir::{Namespaces, NodeRef, XPath};
use tracing::{debug, trace};

use crate::{Error, Result};

/// ISO Schematron namespace
pub const SCHEMATRON_NAMESPACE: &str = "http://purl.oclc.org/dsdl/schematron";

/// Pre-ISO Schematron 1.5 namespace, still common in the wild
pub const LEGACY_SCHEMATRON_NAMESPACE: &str = "http://www.ascc.net/xml/schematron";

/// Assertion flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Fires when the test is false
    Assert,
    /// Fires when the test is true
    Report,
}

/// One `assert` or `report`
#[derive(Debug, Clone)]
pub struct Check {
    pub kind: CheckKind,
    /// Declared id, or a positional id (`pattern.rule.check`) when absent
    pub id: String,
    pub role: Option<String>,
    pub test: XPath,
    pub message: String,
}

impl Check {
    /// Whether the check is declared as a warning (`role="warning"`).
    #[must_use]
    pub fn is_warning(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.eq_ignore_ascii_case("warning") || r.eq_ignore_ascii_case("warn"))
    }

    /// Whether a test outcome means the check fires.
    #[must_use]
    pub fn fires(&self, outcome: bool) -> bool {
        match self.kind {
            CheckKind::Assert => !outcome,
            CheckKind::Report => outcome,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub id: Option<String>,
    pub context: XPath,
    pub checks: Vec<Check>,
}

#[derive(Debug, Clone)]
pub struct Pattern {
    pub id: Option<String>,
    pub title: Option<String>,
    pub rules: Vec<Rule>,
}

/// A compiled rule file
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub title: Option<String>,
    pub namespaces: Namespaces,
    pub patterns: Vec<Pattern>,
}

impl RuleSet {
    /// Compile a Schematron document.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is not well-formed, is not a Schematron
    /// schema, lacks required attributes, or contains an expression that does
    /// not compile or uses an undeclared namespace prefix.
    pub fn compile(bytes: &[u8]) -> Result<Self> {
        let doc = mits_adapter_xml::parse(bytes)?;
        let root = doc
            .root()
            .ok_or_else(|| Error::invalid_rules("document has no root element"))?;
        let is_schematron = matches!(
            root.namespace(),
            Some(SCHEMATRON_NAMESPACE | LEGACY_SCHEMATRON_NAMESPACE)
        );
        if root.local_name() != Some("schema") || !is_schematron {
            return Err(Error::invalid_rules(format!(
                "root element must be a Schematron schema, found <{}>",
                root.name().map(ToString::to_string).unwrap_or_default()
            )));
        }

        let mut rules = RuleSet {
            title: root.child("title").map(|t| normalize(&t.string_value())),
            ..RuleSet::default()
        };

        for ns in root.child_elements().filter(|c| c.local_name() == Some("ns")) {
            let (Some(prefix), Some(uri)) = (ns.attribute("prefix"), ns.attribute("uri")) else {
                return Err(Error::invalid_rules("<ns> requires prefix and uri"));
            };
            rules.namespaces.insert(prefix.to_string(), uri.to_string());
        }

        for (p_idx, pattern) in root
            .child_elements()
            .filter(|c| c.local_name() == Some("pattern"))
            .enumerate()
        {
            if pattern.attribute("abstract") == Some("true") || pattern.attribute("is-a").is_some() {
                debug!(pattern = ?pattern.attribute("id"), "abstract pattern ignored");
                continue;
            }
            let compiled = rules.pattern(pattern, p_idx + 1)?;
            rules.patterns.push(compiled);
        }

        debug!(
            patterns = rules.patterns.len(),
            rules = rules.rule_count(),
            checks = rules.check_count(),
            "rule set compiled"
        );
        Ok(rules)
    }

    fn pattern(&self, node: NodeRef<'_>, position: usize) -> Result<Pattern> {
        let pattern_id = node.attribute("id").map(str::to_string);
        let mut rules = Vec::new();
        for (r_idx, rule) in node
            .child_elements()
            .filter(|c| c.local_name() == Some("rule"))
            .enumerate()
        {
            if rule.attribute("abstract") == Some("true") {
                continue;
            }
            let context_src = rule
                .attribute("context")
                .ok_or_else(|| Error::invalid_rules("<rule> requires a context attribute"))?;
            let context = self.expression(context_src, true)?;
            let rule_id = rule.attribute("id").map(str::to_string);

            let mut checks = Vec::new();
            for (c_idx, check) in rule.child_elements().enumerate() {
                let kind = match check.local_name() {
                    Some("assert") => CheckKind::Assert,
                    Some("report") => CheckKind::Report,
                    Some(other) => {
                        trace!(element = other, "rule child ignored");
                        continue;
                    }
                    None => continue,
                };
                let test_src = check
                    .attribute("test")
                    .ok_or_else(|| Error::invalid_rules("<assert>/<report> requires a test attribute"))?;
                let id = check
                    .attribute("id")
                    .map(str::to_string)
                    .or_else(|| rule_id.clone())
                    .or_else(|| pattern_id.clone())
                    .unwrap_or_else(|| format!("{position}.{}.{}", r_idx + 1, c_idx + 1));
                checks.push(Check {
                    kind,
                    id,
                    role: check.attribute("role").map(str::to_string),
                    test: self.expression(test_src, false)?,
                    message: normalize(&check.string_value()),
                });
            }
            rules.push(Rule {
                id: rule_id,
                context,
                checks,
            });
        }
        Ok(Pattern {
            id: pattern_id,
            title: node.child("title").map(|t| normalize(&t.string_value())),
            rules,
        })
    }

    fn expression(&self, source: &str, pattern: bool) -> Result<XPath> {
        let xpath = if pattern {
            XPath::compile_pattern(source)?
        } else {
            XPath::compile(source)?
        };
        if let Some(prefix) = xpath
            .prefixes()
            .into_iter()
            .find(|p| !self.namespaces.contains_key(*p))
        {
            return Err(Error::invalid_rules(format!(
                "expression '{source}' uses undeclared namespace prefix '{prefix}'"
            )));
        }
        Ok(xpath)
    }

    /// Number of concrete rules across all patterns.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.patterns.iter().map(|p| p.rules.len()).sum()
    }

    /// Number of asserts and reports across all rules.
    #[must_use]
    pub fn check_count(&self) -> usize {
        self.patterns
            .iter()
            .flat_map(|p| &p.rules)
            .map(|r| r.checks.len())
            .sum()
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
