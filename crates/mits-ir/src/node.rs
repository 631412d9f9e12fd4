//! Node types for the document tree

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::Position;

/// Index of a node inside its document arena.
///
/// Ids are assigned in document order, so comparing two ids of the same
/// document compares their document positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Raw arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Qualified name as written in the source (`prefix:local` or `local`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QName {
    /// Namespace prefix, if any
    pub prefix: Option<String>,

    /// Local part
    pub local: String,
}

impl QName {
    /// Split a raw `prefix:local` name.
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((prefix, local)) => Self {
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => Self {
                prefix: None,
                local: raw.to_string(),
            },
        }
    }

    /// Unprefixed name.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            prefix: None,
            local: local.into(),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{p}:{}", self.local),
            None => f.write_str(&self.local),
        }
    }
}

/// An attribute on an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name
    pub name: QName,

    /// Resolved namespace URI (prefixed attributes only)
    pub namespace: Option<String>,

    /// Unescaped value
    pub value: String,
}

impl Attribute {
    /// Whether this attribute is a namespace declaration.
    #[must_use]
    pub fn is_namespace_declaration(&self) -> bool {
        matches!(self.name.prefix.as_deref(), Some("xmlns"))
            || (self.name.prefix.is_none() && self.name.local == "xmlns")
    }
}

/// Element payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    /// Element name
    pub name: QName,

    /// Resolved namespace URI
    pub namespace: Option<String>,

    /// Attributes in source order, namespace declarations included
    pub attributes: Vec<Attribute>,

    /// Start-tag position
    pub position: Position,
}

impl ElementData {
    /// Create an element with no namespace and no attributes
    pub fn new(name: QName) -> Self {
        Self {
            name,
            namespace: None,
            attributes: Vec::new(),
            position: Position::default(),
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: QName::parse(name),
            namespace: None,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Attribute value by local name, ignoring namespace declarations.
    #[must_use]
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| !a.is_namespace_declaration() && a.name.local == local)
            .map(|a| a.value.as_str())
    }
}

/// Types of nodes in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Document node, parent of the root element
    Document,

    /// Element node
    Element(ElementData),

    /// Character data (text and CDATA merged)
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_parse() {
        let q = QName::parse("mits:Property");
        assert_eq!(q.prefix.as_deref(), Some("mits"));
        assert_eq!(q.local, "Property");
        assert_eq!(q.to_string(), "mits:Property");

        let q = QName::parse("Property");
        assert!(q.prefix.is_none());
        assert_eq!(q.to_string(), "Property");
    }

    #[test]
    fn test_attribute_lookup_skips_namespace_declarations() {
        let el = ElementData::new(QName::local("PropertyMarketing"))
            .with_attribute("xmlns", "http://example.com")
            .with_attribute("version", "5.0");
        assert_eq!(el.attribute("version"), Some("5.0"));
        assert_eq!(el.attribute("xmlns"), None);
    }
}
