//! XPath 1.0 subset.
//!
//! Covers what business-rule assertions over MITS feeds need: location paths
//! with the common axes, predicates, unions, boolean/relational/arithmetic
//! operators and a core function library (plus `exists`, `empty`,
//! `ends-with` and `matches`). Unprefixed name tests match on local name
//! alone, so rules work against feeds that use a default namespace; prefixed
//! tests must resolve through the supplied [`Namespaces`].

mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;

use crate::document::{NodeRef, XmlDocument};
use crate::node::NodeId;
use crate::{Error, Result};
use eval::{Evaluator, Focus};
use parser::{Expr, NodeTest};

/// Prefix → namespace URI bindings used to resolve prefixed name tests
pub type Namespaces = HashMap<String, String>;

/// (name, min args, max args)
const FUNCTIONS: &[(&str, usize, usize)] = &[
    ("true", 0, 0),
    ("false", 0, 0),
    ("position", 0, 0),
    ("last", 0, 0),
    ("not", 1, 1),
    ("boolean", 1, 1),
    ("count", 1, 1),
    ("exists", 1, 1),
    ("empty", 1, 1),
    ("string", 0, 1),
    ("number", 0, 1),
    ("sum", 1, 1),
    ("floor", 1, 1),
    ("ceiling", 1, 1),
    ("round", 1, 1),
    ("string-length", 0, 1),
    ("normalize-space", 0, 1),
    ("contains", 2, 2),
    ("starts-with", 2, 2),
    ("ends-with", 2, 2),
    ("concat", 2, usize::MAX),
    ("local-name", 0, 1),
    ("name", 0, 1),
    ("matches", 2, 2),
];

/// A node selected by an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XPathNode {
    /// Document, element or text node
    Node(NodeId),
    /// Attribute `index` of element `owner`
    Attribute { owner: NodeId, index: usize },
}

impl XPathNode {
    /// Sort key giving document order: attributes follow their element and
    /// precede its children.
    fn order_key(&self) -> (usize, usize) {
        match self {
            XPathNode::Node(id) => (id.index(), 0),
            XPathNode::Attribute { owner, index } => (owner.index(), index + 1),
        }
    }
}

/// Result of evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    Nodes(Vec<XPathNode>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl XPathValue {
    /// Effective boolean value.
    #[must_use]
    pub fn boolean(&self) -> bool {
        match self {
            XPathValue::Nodes(n) => !n.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// String value, resolving node-sets against `doc`.
    #[must_use]
    pub fn string(&self, doc: &XmlDocument) -> String {
        let namespaces = Namespaces::new();
        Evaluator {
            doc,
            namespaces: &namespaces,
            source: "",
        }
        .string(self)
    }

    /// Numeric value, resolving node-sets against `doc`.
    #[must_use]
    pub fn number(&self, doc: &XmlDocument) -> f64 {
        let namespaces = Namespaces::new();
        Evaluator {
            doc,
            namespaces: &namespaces,
            source: "",
        }
        .number(self)
    }

    fn type_name(&self) -> &'static str {
        match self {
            XPathValue::Nodes(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }
}

/// A compiled expression
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    /// Compile an expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::XPathSyntax`] for malformed expressions, unknown
    /// functions and wrong argument counts.
    pub fn compile(source: &str) -> Result<Self> {
        let expr = parser::parse(source)?;
        check_functions(source, &expr)?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Compile a match pattern: relative paths match at any depth, so
    /// `ChargeOfferItem` selects every `ChargeOfferItem` element.
    ///
    /// # Errors
    ///
    /// Same as [`XPath::compile`].
    pub fn compile_pattern(source: &str) -> Result<Self> {
        let mut xpath = Self::compile(source)?;
        xpath.expr = xpath.expr.anchor_anywhere();
        Ok(xpath)
    }

    /// Expression text as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Namespace prefixes referenced by name tests.
    #[must_use]
    pub fn prefixes(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_prefixes(&self.expr, &mut out);
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Evaluate with `context` as the context node.
    ///
    /// # Errors
    ///
    /// Returns [`Error::XPathEval`] for type errors, undeclared prefixes and
    /// invalid regular expressions.
    pub fn evaluate(&self, context: NodeRef<'_>, namespaces: &Namespaces) -> Result<XPathValue> {
        let evaluator = Evaluator {
            doc: context.document(),
            namespaces,
            source: &self.source,
        };
        evaluator.eval(
            &self.expr,
            Focus {
                item: XPathNode::Node(context.id()),
                position: 1,
                size: 1,
            },
        )
    }

    /// Evaluate and take the effective boolean value.
    ///
    /// # Errors
    ///
    /// Same as [`XPath::evaluate`].
    pub fn evaluate_bool(&self, context: NodeRef<'_>, namespaces: &Namespaces) -> Result<bool> {
        Ok(self.evaluate(context, namespaces)?.boolean())
    }

    /// Evaluate and return the selected document nodes (attributes are skipped).
    ///
    /// # Errors
    ///
    /// Returns [`Error::XPathEval`] when the expression does not yield a node-set.
    pub fn select<'a>(&self, context: NodeRef<'a>, namespaces: &Namespaces) -> Result<Vec<NodeRef<'a>>> {
        match self.evaluate(context, namespaces)? {
            XPathValue::Nodes(nodes) => Ok(nodes
                .into_iter()
                .filter_map(|n| match n {
                    XPathNode::Node(id) => context.document().get(id),
                    XPathNode::Attribute { .. } => None,
                })
                .collect()),
            other => Err(Error::xpath_eval(
                &self.source,
                format!("expected a node-set, found {}", other.type_name()),
            )),
        }
    }
}

fn check_functions(source: &str, expr: &Expr) -> Result<()> {
    let mut result: Result<()> = Ok(());
    visit(expr, &mut |e| {
        if result.is_err() {
            return;
        }
        if let Expr::Function(name, args) = e {
            result = match FUNCTIONS.iter().find(|(n, _, _)| *n == name.as_str()) {
                None => Err(Error::xpath_syntax(source, 0, format!("unknown function '{name}()'"))),
                Some((_, min, max)) if args.len() < *min || args.len() > *max => Err(Error::xpath_syntax(
                    source,
                    0,
                    format!("wrong number of arguments to {name}(): {}", args.len()),
                )),
                Some(_) => Ok(()),
            };
        }
    });
    result
}

fn collect_prefixes<'e>(expr: &'e Expr, out: &mut Vec<&'e str>) {
    let push_steps = |steps: &'e [parser::Step], out: &mut Vec<&'e str>| {
        for step in steps {
            match &step.test {
                NodeTest::Name { prefix: Some(p), .. } | NodeTest::Any { prefix: Some(p) } => {
                    out.push(p.as_str());
                }
                _ => {}
            }
            for pred in &step.predicates {
                collect_prefixes(pred, out);
            }
        }
    };
    match expr {
        Expr::Path { steps, .. } => push_steps(steps, out),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            collect_prefixes(primary, out);
            for p in predicates {
                collect_prefixes(p, out);
            }
            push_steps(steps, out);
        }
        Expr::Binary(_, a, b) | Expr::Union(a, b) => {
            collect_prefixes(a, out);
            collect_prefixes(b, out);
        }
        Expr::Negate(a) => collect_prefixes(a, out),
        Expr::Function(_, args) => {
            for a in args {
                collect_prefixes(a, out);
            }
        }
        Expr::Literal(_) | Expr::Number(_) => {}
    }
}

fn visit(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
    f(expr);
    let visit_steps = |steps: &[parser::Step], f: &mut dyn FnMut(&Expr)| {
        for step in steps {
            for p in &step.predicates {
                visit(p, f);
            }
        }
    };
    match expr {
        Expr::Binary(_, a, b) | Expr::Union(a, b) => {
            visit(a, f);
            visit(b, f);
        }
        Expr::Negate(a) => visit(a, f),
        Expr::Function(_, args) => {
            for a in args {
                visit(a, f);
            }
        }
        Expr::Path { steps, .. } => visit_steps(steps, f),
        Expr::Filter {
            primary,
            predicates,
            steps,
        } => {
            visit(primary, f);
            for p in predicates {
                visit(p, f);
            }
            visit_steps(steps, f);
        }
        Expr::Literal(_) | Expr::Number(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::sample;

    fn eval(expr: &str) -> XPathValue {
        let doc = sample();
        let root = doc.root().unwrap();
        XPath::compile(expr)
            .unwrap()
            .evaluate(root, &Namespaces::new())
            .unwrap()
    }

    fn eval_bool(expr: &str) -> bool {
        eval(expr).boolean()
    }

    #[test]
    fn test_count_and_paths() {
        assert_eq!(eval("count(Item)"), XPathValue::Number(2.0));
        assert_eq!(eval("count(//Code)"), XPathValue::Number(2.0));
        assert_eq!(eval("count(/Root/Item/Note)"), XPathValue::Number(1.0));
        assert_eq!(eval("count(//@id)"), XPathValue::Number(2.0));
        assert_eq!(eval("count(Item/*)"), XPathValue::Number(3.0));
    }

    #[test]
    fn test_predicates() {
        assert!(eval_bool("Item[2]/Note = 'x'"));
        assert!(eval_bool("Item[@id='B']/Code = 'B'"));
        assert!(!eval_bool("Item[1]/Note"));
        assert!(eval_bool("count(Item[last()]/Note) = 1"));
        assert!(eval_bool("count(Item[Note]) = 1"));
    }

    #[test]
    fn test_existential_comparison() {
        assert!(eval_bool("Item/Code = 'B'"));
        assert!(eval_bool("Item/Code != 'B'"));
        assert!(!eval_bool("Item/Code = 'C'"));
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(eval("concat(Item[1]/Code, '-', Item[2]/Code)"), XPathValue::String("A-B".into()));
        assert_eq!(eval("normalize-space('  a   b ')"), XPathValue::String("a b".into()));
        assert_eq!(eval("string-length('abc')"), XPathValue::Number(3.0));
        assert!(eval_bool("starts-with(local-name(), 'Ro')"));
        assert!(eval_bool("ends-with(name(Item), 'em')"));
        assert!(eval_bool("contains(string(.), 'ABx')"));
        assert!(eval_bool("matches(Item[1]/@id, '^[A-Z]$')"));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("7 mod 3"), XPathValue::Number(1.0));
        assert_eq!(eval("-(2 * 3) + 10 div 4"), XPathValue::Number(-3.5));
        assert!(eval("number('x')").number(&sample()).is_nan());
    }

    #[test]
    fn test_axes() {
        assert!(eval_bool("Item[1]/following-sibling::Item/@id = 'B'"));
        assert!(eval_bool("Item[2]/preceding-sibling::Item[1]/@id = 'A'"));
        assert!(eval_bool("count(//Code/ancestor::Item) = 2"));
        assert!(eval_bool("//Note/../@id = 'B'"));
        assert!(eval_bool("count(Item/Code/text()) = 2"));
        assert!(eval_bool("Item[1]/self::Item"));
    }

    #[test]
    fn test_exists_and_empty() {
        assert!(eval_bool("exists(Item)"));
        assert!(eval_bool("empty(Missing)"));
        assert!(eval_bool("not(Missing)"));
    }

    #[test]
    fn test_union_is_document_ordered() {
        let doc = sample();
        let root = doc.root().unwrap();
        let nodes = XPath::compile("//Note | //Code")
            .unwrap()
            .select(root, &Namespaces::new())
            .unwrap();
        let texts: Vec<String> = nodes.iter().map(NodeRef::text).collect();
        assert_eq!(texts, vec!["A", "B", "x"]);
    }

    #[test]
    fn test_pattern_matches_anywhere() {
        let doc = sample();
        let item = doc.descendants_by_local_name("Code")[1];
        let nodes = XPath::compile_pattern("Item")
            .unwrap()
            .select(item, &Namespaces::new())
            .unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_compile_errors() {
        assert!(XPath::compile("bogus(1)").is_err());
        assert!(XPath::compile("count()").is_err());
        assert!(XPath::compile("concat('a')").is_err());
        assert!(XPath::compile("Item[").is_err());
    }

    #[test]
    fn test_prefixes_and_undeclared_prefix() {
        let xp = XPath::compile("count(m:Item[m:Code]) > 0 and p:*").unwrap();
        assert_eq!(xp.prefixes(), vec!["m", "p"]);

        let doc = sample();
        let err = xp.evaluate(doc.root().unwrap(), &Namespaces::new()).unwrap_err();
        assert!(matches!(err, Error::XPathEval { .. }));
    }

    #[test]
    fn test_select_requires_node_set() {
        let doc = sample();
        let err = XPath::compile("1 + 1")
            .unwrap()
            .select(doc.root().unwrap(), &Namespaces::new())
            .unwrap_err();
        assert!(matches!(err, Error::XPathEval { .. }));
    }
}
