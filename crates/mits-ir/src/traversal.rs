//! Traversal and cursor APIs for navigating the document tree

use crate::document::NodeRef;
use crate::node::NodeKind;
use crate::{Error, Result};

/// A cursor for navigating elements by local name
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    /// Current node
    node: NodeRef<'a>,

    /// Path to current node (for error reporting)
    path: Vec<String>,
}

/// Trait for traversing the element tree
pub trait Traversal {
    /// Visit an element; `path` holds the local names of its ancestors
    fn visit(&mut self, node: NodeRef<'_>, path: &[String]);

    /// Called when entering an element with child elements
    fn enter(&mut self, _node: NodeRef<'_>, _path: &[String]) {}

    /// Called when leaving an element with child elements
    fn leave(&mut self, _node: NodeRef<'_>, _path: &[String]) {}

    /// Returns true if traversal should continue
    fn should_continue(&self) -> bool {
        true
    }
}

impl<'a> Cursor<'a> {
    /// Create a new cursor at the given node
    #[must_use]
    pub fn new(node: NodeRef<'a>) -> Self {
        Self {
            node,
            path: vec![node.local_name().unwrap_or_default().to_string()],
        }
    }

    /// Get the current node
    #[must_use]
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    /// Get the current path
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Trimmed text of the current element
    #[must_use]
    pub fn value(&self) -> String {
        self.node.text().trim().to_string()
    }

    fn descend(&self, node: NodeRef<'a>, segment: String) -> Cursor<'a> {
        let mut path = self.path.clone();
        path.push(segment);
        Cursor { node, path }
    }

    /// Navigate to the first child element with the given local name
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] when no such child exists.
    pub fn child(&self, name: &str) -> Result<Cursor<'a>> {
        match self.node.child(name) {
            Some(child) => Ok(self.descend(child, name.to_string())),
            None => Err(Error::node_not_found(format!(
                "{}/{}",
                self.path.join("/"),
                name
            ))),
        }
    }

    /// Navigate to a child element by zero-based index
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotFound`] when the index is out of range.
    pub fn child_at(&self, index: usize) -> Result<Cursor<'a>> {
        match self.node.child_elements().nth(index) {
            Some(child) => {
                let name = child.local_name().unwrap_or_default().to_string();
                Ok(self.descend(child, name))
            }
            None => Err(Error::node_not_found(format!(
                "{}[{}]",
                self.path.join("/"),
                index
            ))),
        }
    }

    /// Get all child elements matching a local name
    #[must_use]
    pub fn children(&self, name: &str) -> Vec<Cursor<'a>> {
        self.node
            .child_elements()
            .filter(|c| c.local_name() == Some(name))
            .enumerate()
            .map(|(idx, child)| self.descend(child, format!("{}[{}]", name, idx + 1)))
            .collect()
    }

    /// Navigate using a path (e.g., "Property/ChargeOffer/ChargeOfferItem[2]/Amount")
    ///
    /// Indexes are 1-based, as in the node paths reported in findings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] for malformed segments and
    /// [`Error::NodeNotFound`] when a step does not resolve.
    pub fn navigate(&self, path: &str) -> Result<Cursor<'a>> {
        let mut current = self.clone();

        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }

            let (name, index) = match segment.find('[') {
                Some(open) => {
                    let close = segment
                        .find(']')
                        .ok_or_else(|| Error::invalid_path(path, format!("unclosed bracket in {segment}")))?;
                    let index: usize = segment[open + 1..close]
                        .parse()
                        .map_err(|_| Error::invalid_path(path, format!("invalid index in {segment}")))?;
                    if index == 0 {
                        return Err(Error::invalid_path(path, "indexes start at 1"));
                    }
                    (&segment[..open], index)
                }
                None => (segment, 1),
            };

            let next = current
                .node
                .child_elements()
                .filter(|c| c.local_name() == Some(name))
                .nth(index - 1)
                .ok_or_else(|| {
                    Error::node_not_found(format!("{}/{}", current.path.join("/"), segment))
                })?;
            current = current.descend(next, segment.to_string());
        }

        Ok(current)
    }
}

/// Walk the element tree using a visitor
pub fn walk<T: Traversal>(node: NodeRef<'_>, visitor: &mut T) {
    walk_recursive(node, visitor, &mut vec![]);
}

fn walk_recursive<T: Traversal>(node: NodeRef<'_>, visitor: &mut T, path: &mut Vec<String>) {
    if !visitor.should_continue() {
        return;
    }

    if !node.is_element() {
        return;
    }

    visitor.visit(node, path);

    if node.child_elements().next().is_some() {
        visitor.enter(node, path);
        path.push(node.local_name().unwrap_or_default().to_string());

        for child in node.child_elements() {
            walk_recursive(child, visitor, path);
        }

        path.pop();
        visitor.leave(node, path);
    }
}

/// Render a path expression for a node.
///
/// Steps use the qualified name as written in the source. A 1-based position
/// is added only when the parent has several elements of that name, so
/// `/PropertyMarketing/Property/PropertyID` stays short while repeated items
/// read `/PropertyMarketing/Property/ChargeOffer/ChargeOfferItem[2]`.
#[must_use]
pub fn node_path(node: NodeRef<'_>) -> String {
    let mut steps = Vec::new();
    let mut current = Some(node);

    while let Some(n) = current {
        match n.kind() {
            NodeKind::Document => break,
            NodeKind::Text(_) => steps.push("text()".to_string()),
            NodeKind::Element(e) => {
                let name = e.name.to_string();
                let step = match n.parent() {
                    Some(parent) => {
                        let same: Vec<_> = parent
                            .child_elements()
                            .filter(|s| s.name() == Some(&e.name))
                            .collect();
                        if same.len() > 1 {
                            let pos = same.iter().position(|s| *s == n).unwrap_or(0) + 1;
                            format!("{name}[{pos}]")
                        } else {
                            name
                        }
                    }
                    None => name,
                };
                steps.push(step);
            }
        }
        current = n.parent();
    }

    steps.reverse();
    format!("/{}", steps.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tests::sample;

    #[test]
    fn test_cursor_creation() {
        let doc = sample();
        let cursor = Cursor::new(doc.root().unwrap());
        assert_eq!(cursor.path(), &["Root"]);
    }

    #[test]
    fn test_cursor_child() {
        let doc = sample();
        let cursor = Cursor::new(doc.root().unwrap());
        let item = cursor.child("Item").unwrap();
        let code = item.child("Code").unwrap();
        assert_eq!(code.value(), "A");
        assert_eq!(code.path(), &["Root", "Item", "Code"]);
    }

    #[test]
    fn test_cursor_child_not_found() {
        let doc = sample();
        let cursor = Cursor::new(doc.root().unwrap());
        match cursor.child("Missing") {
            Err(Error::NodeNotFound { path }) => {
                assert!(path.contains("Root"));
                assert!(path.contains("Missing"));
            }
            other => panic!("Expected NodeNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_cursor_child_at() {
        let doc = sample();
        let cursor = Cursor::new(doc.root().unwrap());
        let second = cursor.child_at(1).unwrap();
        assert_eq!(second.node().attribute("id"), Some("B"));
        assert!(cursor.child_at(5).is_err());
    }

    #[test]
    fn test_cursor_children() {
        let doc = sample();
        let cursor = Cursor::new(doc.root().unwrap());
        let items = cursor.children("Item");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].path(), &["Root", "Item[2]"]);
    }

    #[test]
    fn test_cursor_navigate() {
        let doc = sample();
        let cursor = Cursor::new(doc.root().unwrap());
        let note = cursor.navigate("Item[2]/Note").unwrap();
        assert_eq!(note.value(), "x");

        assert!(matches!(
            cursor.navigate("Item[0]"),
            Err(Error::InvalidPath { .. })
        ));
        assert!(matches!(
            cursor.navigate("Item[1]/Note"),
            Err(Error::NodeNotFound { .. })
        ));
        assert!(matches!(
            cursor.navigate("Item[1"),
            Err(Error::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_walk_visits_elements_in_order() {
        struct Collector(Vec<String>);
        impl Traversal for Collector {
            fn visit(&mut self, node: NodeRef<'_>, path: &[String]) {
                self.0.push(format!(
                    "{}/{}",
                    path.join("/"),
                    node.local_name().unwrap_or_default()
                ));
            }
        }

        let doc = sample();
        let mut c = Collector(Vec::new());
        walk(doc.root().unwrap(), &mut c);
        assert_eq!(
            c.0,
            vec![
                "/Root",
                "Root/Item",
                "Root/Item/Code",
                "Root/Item",
                "Root/Item/Code",
                "Root/Item/Note"
            ]
        );
    }

    #[test]
    fn test_walk_stops_early() {
        struct FirstOnly(usize);
        impl Traversal for FirstOnly {
            fn visit(&mut self, _node: NodeRef<'_>, _path: &[String]) {
                self.0 += 1;
            }
            fn should_continue(&self) -> bool {
                self.0 < 2
            }
        }

        let doc = sample();
        let mut v = FirstOnly(0);
        walk(doc.root().unwrap(), &mut v);
        assert_eq!(v.0, 2);
    }

    #[test]
    fn test_node_path_indexes_only_repeated_siblings() {
        let doc = sample();
        let codes = doc.descendants_by_local_name("Code");
        assert_eq!(node_path(codes[0]), "/Root/Item[1]/Code");
        assert_eq!(node_path(codes[1]), "/Root/Item[2]/Code");
        let note = doc.descendants_by_local_name("Note")[0];
        assert_eq!(note.path(), "/Root/Item[2]/Note");
        assert_eq!(doc.root().unwrap().path(), "/Root");
    }
}
