//! Source positions, namespace scoping and content-type helpers

use std::collections::HashMap;

use mits_ir::Position;

/// Namespace bound to the reserved `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// UTF-8 byte order mark
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Maps byte offsets to 1-based line/column pairs
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    data: &'a [u8],
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Index the line starts of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            data.iter()
                .enumerate()
                .filter(|(_, b)| **b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { data, line_starts }
    }

    /// 1-based line and column (in characters) of a byte offset.
    #[must_use]
    pub fn line_column(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.data.len());
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let start = self.line_starts[line_idx];
        let column = String::from_utf8_lossy(&self.data[start..offset]).chars().count() + 1;
        (line_idx + 1, column)
    }

    /// Position record for a byte range.
    #[must_use]
    pub fn position(&self, offset: usize, length: usize) -> Position {
        let (line, column) = self.line_column(offset);
        Position::new(line, column, offset, length)
    }

    /// Number of lines.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// Stack of in-scope namespace bindings
#[derive(Debug, Clone)]
pub struct NamespaceScope {
    frames: Vec<HashMap<String, String>>,
}

impl NamespaceScope {
    /// Scope with only the `xml` prefix bound.
    #[must_use]
    pub fn new() -> Self {
        let mut root = HashMap::new();
        root.insert("xml".to_string(), XML_NAMESPACE.to_string());
        Self { frames: vec![root] }
    }

    /// Open a scope for an element with the given declarations
    /// (`""` is the default namespace).
    pub fn push(&mut self, declarations: HashMap<String, String>) {
        self.frames.push(declarations);
    }

    pub fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Resolve a prefix (`None` for the default namespace).
    ///
    /// An empty default namespace declaration (`xmlns=""`) resolves to `None`.
    #[must_use]
    pub fn resolve(&self, prefix: Option<&str>) -> Option<&str> {
        let key = prefix.unwrap_or("");
        self.frames
            .iter()
            .rev()
            .find_map(|f| f.get(key))
            .map(String::as_str)
            .filter(|uri| !uri.is_empty())
    }

    /// Whether a prefix is bound at all.
    #[must_use]
    pub fn is_bound(&self, prefix: &str) -> bool {
        self.resolve(Some(prefix)).is_some()
    }
}

impl Default for NamespaceScope {
    fn default() -> Self {
        Self::new()
    }
}

/// Media type of a content-type header value, lowercased and without parameters.
#[must_use]
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Whether a declared content type names an XML media type
/// (`application/xml`, `text/xml`, `application/atom+xml`, ...).
#[must_use]
pub fn is_markup_content_type(content_type: &str) -> bool {
    media_type(content_type).contains("xml")
}

/// Input without a leading UTF-8 byte order mark, plus the number of bytes skipped.
#[must_use]
pub fn strip_bom(data: &[u8]) -> (&[u8], usize) {
    match data.strip_prefix(UTF8_BOM) {
        Some(rest) => (rest, UTF8_BOM.len()),
        None => (data, 0),
    }
}
