//! Schema model for the subset of XML Schema used by feed schemas
//!
//! Types are stored in arenas on [`XsdSchema`] and referenced by index, so
//! recursive and forward type references need no shared ownership.

mod builtin;
mod compiler;

pub use builtin::BuiltinType;

use std::collections::BTreeMap;

use regex::Regex;

use crate::Result;

/// XML Schema namespace
pub const XS_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// Limit on simple-type derivation chains
const MAX_DERIVATION_DEPTH: usize = 32;

/// Upper occurrence bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded,
}

impl MaxOccurs {
    /// Whether `count` occurrences stay within the bound.
    #[must_use]
    pub fn allows(self, count: u32) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count <= max,
            MaxOccurs::Unbounded => true,
        }
    }
}

/// `minOccurs` / `maxOccurs` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    pub min: u32,
    pub max: MaxOccurs,
}

impl Default for Occurs {
    fn default() -> Self {
        Self {
            min: 1,
            max: MaxOccurs::Bounded(1),
        }
    }
}

/// Reference to the type of an element or attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Builtin(BuiltinType),
    /// Index into [`XsdSchema::simple_types`]
    Simple(usize),
    /// Index into [`XsdSchema::complex_types`]
    Complex(usize),
    /// Same type as the named global element (`ref="..."`)
    Element(String),
}

/// Element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    pub name: String,
    pub occurs: Occurs,
    pub type_ref: TypeRef,
}

/// Model group compositor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    Sequence,
    Choice,
    All,
}

/// One item of a content model
#[derive(Debug, Clone)]
pub enum Particle {
    Element(ElementDecl),
    Group(ModelGroup),
    /// `xs:any` wildcard
    Any(Occurs),
}

impl Particle {
    #[must_use]
    pub fn occurs(&self) -> Occurs {
        match self {
            Particle::Element(e) => e.occurs,
            Particle::Group(g) => g.occurs,
            Particle::Any(o) => *o,
        }
    }
}

/// `xs:sequence`, `xs:choice` or `xs:all`
#[derive(Debug, Clone)]
pub struct ModelGroup {
    pub compositor: Compositor,
    pub occurs: Occurs,
    pub particles: Vec<Particle>,
}

/// Attribute declaration
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    pub name: String,
    pub required: bool,
    pub type_ref: TypeRef,
}

/// Content of a complex type
#[derive(Debug, Clone, Default)]
pub enum Content {
    /// No child elements and no text
    #[default]
    Empty,
    /// Child elements matching a model group
    Elements(ModelGroup),
    /// Text of a simple type (`xs:simpleContent`)
    Simple(TypeRef),
}

/// Complex type definition
#[derive(Debug, Clone, Default)]
pub struct ComplexType {
    pub name: Option<String>,
    pub content: Content,
    pub attributes: Vec<AttributeDecl>,
    pub any_attribute: bool,
    pub mixed: bool,
}

impl ComplexType {
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Restriction facets
#[derive(Debug, Clone, Default)]
pub struct Facets {
    pub enumeration: Vec<String>,
    pub patterns: Vec<Regex>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<f64>,
    pub max_inclusive: Option<f64>,
    pub min_exclusive: Option<f64>,
    pub max_exclusive: Option<f64>,
}

impl Facets {
    /// Check a normalized value against every facet.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated facet.
    pub fn check(&self, value: &str) -> std::result::Result<(), String> {
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|e| e == value) {
            return Err(format!(
                "'{value}' is not one of the allowed values ({})",
                self.enumeration.join(", ")
            ));
        }
        for pattern in &self.patterns {
            if !pattern.is_match(value) {
                return Err(format!("'{value}' does not match pattern {}", display_pattern(pattern)));
            }
        }

        let len = value.chars().count();
        if let Some(n) = self.length.filter(|n| len != *n) {
            return Err(format!("'{value}' has length {len}, expected {n}"));
        }
        if let Some(n) = self.min_length.filter(|n| len < *n) {
            return Err(format!("'{value}' is shorter than the minimum length {n}"));
        }
        if let Some(n) = self.max_length.filter(|n| len > *n) {
            return Err(format!("'{value}' is longer than the maximum length {n}"));
        }

        if self.has_range() {
            let number: f64 = value
                .parse()
                .map_err(|_| format!("'{value}' is not a number"))?;
            let out_of_range = self.min_inclusive.is_some_and(|m| number < m)
                || self.max_inclusive.is_some_and(|m| number > m)
                || self.min_exclusive.is_some_and(|m| number <= m)
                || self.max_exclusive.is_some_and(|m| number >= m);
            if out_of_range {
                return Err(format!("'{value}' is outside the allowed range"));
            }
        }
        Ok(())
    }

    fn has_range(&self) -> bool {
        self.min_inclusive.is_some()
            || self.max_inclusive.is_some()
            || self.min_exclusive.is_some()
            || self.max_exclusive.is_some()
    }
}

/// Patterns are stored anchored; show them as written.
fn display_pattern(pattern: &Regex) -> &str {
    let s = pattern.as_str();
    s.strip_prefix("^(?:")
        .and_then(|s| s.strip_suffix(")$"))
        .unwrap_or(s)
}

/// Simple type definition (restriction of a base type)
#[derive(Debug, Clone)]
pub struct SimpleType {
    pub name: Option<String>,
    pub base: TypeRef,
    pub facets: Facets,
}

impl Default for SimpleType {
    fn default() -> Self {
        Self {
            name: None,
            base: TypeRef::Builtin(BuiltinType::AnySimpleType),
            facets: Facets::default(),
        }
    }
}

/// A compiled schema
#[derive(Debug, Clone, Default)]
pub struct XsdSchema {
    pub target_namespace: Option<String>,
    pub elements: BTreeMap<String, ElementDecl>,
    pub simple_types: Vec<SimpleType>,
    pub complex_types: Vec<ComplexType>,
}

impl XsdSchema {
    /// Compile a schema document.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not well-formed, is not a schema,
    /// or references undefined types or elements.
    pub fn compile(bytes: &[u8]) -> Result<Self> {
        compiler::compile(bytes)
    }

    /// Global element declaration by name.
    #[must_use]
    pub fn global_element(&self, name: &str) -> Option<&ElementDecl> {
        self.elements.get(name)
    }

    #[must_use]
    pub fn named_complex_type(&self, name: &str) -> Option<&ComplexType> {
        self.complex_types
            .iter()
            .find(|ct| ct.name.as_deref() == Some(name))
    }

    /// Follow `ref` indirections to a concrete type.
    #[must_use]
    pub fn resolve<'a>(&'a self, type_ref: &'a TypeRef) -> &'a TypeRef {
        let mut current = type_ref;
        for _ in 0..MAX_DERIVATION_DEPTH {
            match current {
                TypeRef::Element(name) => match self.elements.get(name) {
                    Some(decl) => current = &decl.type_ref,
                    None => return current,
                },
                _ => return current,
            }
        }
        current
    }

    /// Complex type behind a reference, if it is one.
    #[must_use]
    pub fn complex_type(&self, type_ref: &TypeRef) -> Option<&ComplexType> {
        match self.resolve(type_ref) {
            TypeRef::Complex(idx) => self.complex_types.get(*idx),
            _ => None,
        }
    }

    /// Built-in type at the bottom of a simple type's derivation chain.
    #[must_use]
    pub fn builtin_base(&self, type_ref: &TypeRef) -> BuiltinType {
        let mut current = self.resolve(type_ref);
        for _ in 0..MAX_DERIVATION_DEPTH {
            match current {
                TypeRef::Builtin(b) => return *b,
                TypeRef::Simple(idx) => match self.simple_types.get(*idx) {
                    Some(st) => current = self.resolve(&st.base),
                    None => break,
                },
                TypeRef::Complex(_) | TypeRef::Element(_) => return BuiltinType::AnyType,
            }
        }
        BuiltinType::AnySimpleType
    }

    /// Check a text value against a simple type (built-in or derived).
    ///
    /// Complex types accept any value here; their content is checked
    /// structurally.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn check_value(&self, type_ref: &TypeRef, value: &str) -> std::result::Result<(), String> {
        let builtin = self.builtin_base(type_ref);
        let normalized = builtin.normalize(value);
        self.check_normalized(type_ref, &normalized, 0)
    }

    fn check_normalized(&self, type_ref: &TypeRef, value: &str, depth: usize) -> std::result::Result<(), String> {
        if depth > MAX_DERIVATION_DEPTH {
            return Ok(());
        }
        match self.resolve(type_ref) {
            TypeRef::Builtin(b) => b.check(value),
            TypeRef::Simple(idx) => {
                let Some(st) = self.simple_types.get(*idx) else {
                    return Ok(());
                };
                self.check_normalized(&st.base, value, depth + 1)?;
                st.facets.check(value)
            }
            TypeRef::Complex(_) | TypeRef::Element(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facets() {
        let facets = Facets {
            enumeration: vec!["Required".into(), "Optional".into()],
            ..Facets::default()
        };
        assert!(facets.check("Required").is_ok());
        assert!(facets.check("Sometimes").unwrap_err().contains("allowed values"));

        let facets = Facets {
            patterns: vec![Regex::new("^(?:[A-Z]{2})$").unwrap()],
            max_length: Some(2),
            ..Facets::default()
        };
        assert!(facets.check("TX").is_ok());
        let err = facets.check("Texas").unwrap_err();
        assert!(err.contains("[A-Z]{2}"), "{err}");

        let facets = Facets {
            min_inclusive: Some(0.0),
            max_exclusive: Some(100.0),
            ..Facets::default()
        };
        assert!(facets.check("0").is_ok());
        assert!(facets.check("100").is_err());
        assert!(facets.check("abc").is_err());
    }

    #[test]
    fn test_max_occurs() {
        assert!(MaxOccurs::Bounded(2).allows(2));
        assert!(!MaxOccurs::Bounded(2).allows(3));
        assert!(MaxOccurs::Unbounded.allows(u32::MAX));
    }

    #[test]
    fn test_derived_simple_type() {
        let mut schema = XsdSchema::default();
        schema.simple_types.push(SimpleType {
            name: Some("Amount".into()),
            base: TypeRef::Builtin(BuiltinType::Decimal),
            facets: Facets {
                min_inclusive: Some(0.0),
                ..Facets::default()
            },
        });
        schema.simple_types.push(SimpleType {
            name: Some("SmallAmount".into()),
            base: TypeRef::Simple(0),
            facets: Facets {
                max_inclusive: Some(10.0),
                ..Facets::default()
            },
        });
        let small = TypeRef::Simple(1);
        assert_eq!(schema.builtin_base(&small), BuiltinType::Decimal);
        assert!(schema.check_value(&small, " 5.5 ").is_ok());
        assert!(schema.check_value(&small, "11").is_err());
        assert!(schema.check_value(&small, "-1").is_err());
        assert!(schema.check_value(&small, "five").is_err());
    }
}
