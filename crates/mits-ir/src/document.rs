//! Document representation
#![allow(clippy::must_use_candidate)]

use std::fmt;

use crate::metadata::{Position, XmlDeclaration};
use crate::node::{Attribute, ElementData, NodeId, NodeKind, QName};
use crate::traversal::node_path;

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed markup document.
///
/// Immutable once built; share it behind `&` or `Arc` across stages.
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<NodeData>,
    declaration: Option<XmlDeclaration>,
}

/// Borrowed handle to one node of a document
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a XmlDocument,
    id: NodeId,
}

impl XmlDocument {
    /// The document node (parent of the root element).
    pub fn document_node(&self) -> NodeRef<'_> {
        self.node(NodeId(0))
    }

    /// The root element, if the document has one.
    pub fn root(&self) -> Option<NodeRef<'_>> {
        self.document_node().child_elements().next()
    }

    /// Handle for a node id.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this document.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        assert!(id.0 < self.nodes.len(), "node id out of range");
        NodeRef { doc: self, id }
    }

    /// Handle for a node id, if it belongs to this document.
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.0 < self.nodes.len()).then_some(NodeRef { doc: self, id })
    }

    /// All elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeRef<'_>> {
        (0..self.nodes.len())
            .map(|i| NodeRef { doc: self, id: NodeId(i) })
            .filter(NodeRef::is_element)
    }

    /// All elements with the given local name, whatever their namespace or prefix.
    pub fn descendants_by_local_name(&self, local: &str) -> Vec<NodeRef<'_>> {
        self.elements()
            .filter(|n| n.local_name() == Some(local))
            .collect()
    }

    /// Parsed `<?xml ...?>` declaration.
    pub fn declaration(&self) -> Option<&XmlDeclaration> {
        self.declaration.as_ref()
    }

    /// Number of nodes, document node included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the document has no root element.
    pub fn is_empty(&self) -> bool {
        self.root().is_none()
    }
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &'a XmlDocument {
        self.doc
    }

    fn data(&self) -> &'a NodeData {
        &self.doc.nodes[self.id.0]
    }

    pub fn kind(&self) -> &'a NodeKind {
        &self.data().kind
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind(), NodeKind::Element(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind(), NodeKind::Text(_))
    }

    pub fn element(&self) -> Option<&'a ElementData> {
        match self.kind() {
            NodeKind::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&'a QName> {
        self.element().map(|e| &e.name)
    }

    pub fn local_name(&self) -> Option<&'a str> {
        self.element().map(|e| e.name.local.as_str())
    }

    pub fn namespace(&self) -> Option<&'a str> {
        self.element().and_then(|e| e.namespace.as_deref())
    }

    /// Attributes other than namespace declarations.
    pub fn attributes(self) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.element()
            .map(|e| e.attributes.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|a| !a.is_namespace_declaration())
    }

    /// `xmlns` and `xmlns:*` attributes declared on this element.
    pub fn namespace_declarations(self) -> impl Iterator<Item = &'a Attribute> + 'a {
        self.element()
            .map(|e| e.attributes.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|a| a.is_namespace_declaration())
    }

    /// Attribute value by local name.
    pub fn attribute(&self, local: &str) -> Option<&'a str> {
        self.element().and_then(|e| e.attribute(local))
    }

    pub fn position(&self) -> Position {
        self.element().map(|e| e.position).unwrap_or_default()
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.data().parent.map(|id| NodeRef { doc: self.doc, id })
    }

    /// All child nodes in document order.
    pub fn children(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let doc = self.doc;
        self.data()
            .children
            .iter()
            .map(move |&id| NodeRef { doc, id })
    }

    /// Child elements in document order.
    pub fn child_elements(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.children().filter(NodeRef::is_element)
    }

    /// First child element with the given local name.
    pub fn child(&self, local: &str) -> Option<NodeRef<'a>> {
        self.child_elements().find(|c| c.local_name() == Some(local))
    }

    /// Direct character content, concatenated.
    pub fn text(&self) -> String {
        match self.kind() {
            NodeKind::Text(t) => t.clone(),
            _ => self
                .children()
                .filter_map(|c| match c.kind() {
                    NodeKind::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// Concatenated text of all descendant text nodes.
    pub fn string_value(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self.kind() {
            NodeKind::Text(t) => out.push_str(t),
            _ => {
                for child in self.children() {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Descendant nodes (not including self) in document order.
    pub fn descendants(&self) -> Vec<NodeRef<'a>> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeRef<'a>> = self.children().collect();
        stack.reverse();
        while let Some(node) = stack.pop() {
            out.push(node);
            let mut kids: Vec<NodeRef<'a>> = node.children().collect();
            kids.reverse();
            stack.extend(kids);
        }
        out
    }

    /// Ancestors from parent up to the document node.
    pub fn ancestors(self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        std::iter::successors(self.parent(), NodeRef::parent)
    }

    /// Path expression locating this node, e.g. `/Root/Item[2]/Code`.
    pub fn path(&self) -> String {
        node_path(*self)
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.doc, other.doc) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("path", &self.path())
            .finish()
    }
}

/// Incremental builder used by parsers.
///
/// Elements are opened and closed in source order; text is attached to the
/// innermost open element. Text outside the root element is dropped.
#[derive(Debug)]
pub struct DocumentBuilder {
    nodes: Vec<NodeData>,
    stack: Vec<NodeId>,
    declaration: Option<XmlDeclaration>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
            stack: Vec::new(),
            declaration: None,
        }
    }

    fn current(&self) -> NodeId {
        self.stack.last().copied().unwrap_or(NodeId(0))
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        let parent = self.current();
        self.nodes.push(NodeData {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Open an element as a child of the current element.
    pub fn open_element(&mut self, element: ElementData) -> NodeId {
        let id = self.push(NodeKind::Element(element));
        self.stack.push(id);
        id
    }

    /// Add an element with no content.
    pub fn empty_element(&mut self, element: ElementData) -> NodeId {
        self.push(NodeKind::Element(element))
    }

    /// Close the innermost open element.
    pub fn close_element(&mut self) -> Option<NodeId> {
        self.stack.pop()
    }

    /// Append character data to the current element, merging adjacent text.
    pub fn text(&mut self, text: &str) {
        if self.stack.is_empty() || text.is_empty() {
            return;
        }
        let parent = self.current();
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push(NodeKind::Text(text.to_string()));
    }

    pub fn set_declaration(&mut self, declaration: XmlDeclaration) {
        self.declaration = Some(declaration);
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Name of the innermost open element.
    pub fn open_name(&self) -> Option<&QName> {
        let id = self.stack.last()?;
        match &self.nodes[id.0].kind {
            NodeKind::Element(e) => Some(&e.name),
            _ => None,
        }
    }

    /// Whether a root element has been started.
    pub fn has_root(&self) -> bool {
        self.nodes[0].children.iter().any(|id| {
            matches!(self.nodes[id.0].kind, NodeKind::Element(_))
        })
    }

    /// Finish building. Any still-open elements are left as they are.
    pub fn finish(self) -> XmlDocument {
        XmlDocument {
            nodes: self.nodes,
            declaration: self.declaration,
        }
    }
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
