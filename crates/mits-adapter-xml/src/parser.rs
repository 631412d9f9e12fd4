//! XML parser
//!
//! Drives a `quick-xml` reader over an in-memory buffer and builds an
//! [`XmlDocument`]. On top of the checks quick-xml performs itself (tag
//! matching, attribute syntax, entity references) the parser enforces a
//! single root element, no character data outside it, and bound namespace
//! prefixes on elements and attributes.

use std::collections::HashMap;

use mits_ir::{Attribute, DocumentBuilder, ElementData, QName, XmlDeclaration, XmlDocument};
use quick_xml::Reader;
use quick_xml::events::{BytesDecl, BytesStart, Event};
use tracing::{debug, trace};

use crate::syntax::{LineIndex, NamespaceScope, strip_bom};
use crate::{Error, Result};

/// Default limit on element nesting
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Parser configuration and entry point
#[derive(Debug, Clone)]
pub struct XmlParser {
    max_depth: usize,
}

impl XmlParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Reject documents nested deeper than `max_depth` elements.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Parse a complete document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] when the input is not UTF-8 and
    /// [`Error::Parse`] for the first well-formedness or namespace problem.
    pub fn parse(&self, bytes: &[u8]) -> Result<XmlDocument> {
        let (data, _) = strip_bom(bytes);
        let index = LineIndex::new(data);

        if let Err(e) = std::str::from_utf8(data) {
            let (line, column) = index.line_column(e.valid_up_to());
            return Err(Error::Encoding {
                line,
                column,
                message: "input is not valid UTF-8".to_string(),
            });
        }

        let mut state = ParseState {
            index: &index,
            builder: DocumentBuilder::new(),
            scope: NamespaceScope::new(),
            max_depth: self.max_depth,
            root_closed: false,
        };

        let mut reader = Reader::from_reader(data);
        reader.config_mut().trim_text(false);

        loop {
            let start = to_offset(reader.buffer_position());
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let offset = to_offset(reader.error_position());
                    let (line, column) = index.line_column(offset);
                    debug!(line, column, error = %e, "XML parse failed");
                    return Err(Error::parse(line, column, reader_message(&e)));
                }
            };
            let end = to_offset(reader.buffer_position());

            match event {
                Event::Start(e) => state.open(&e, start, end, false)?,
                Event::Empty(e) => state.open(&e, start, end, true)?,
                Event::End(_) => state.close(),
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| state.error_at(start, reader_message(&e)))?;
                    state.text(&text, start)?;
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    state.text(&text, start)?;
                }
                Event::Decl(d) => {
                    let declaration = read_declaration(&d).map_err(|m| state.error_at(start, m))?;
                    if let Some(enc) = declaration.encoding.as_deref() {
                        if !is_utf8_compatible(enc) {
                            debug!(encoding = enc, "declared encoding ignored, input decoded as UTF-8");
                        }
                    }
                    state.builder.set_declaration(declaration);
                }
                Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }

        state.finish(data.len())
    }
}

impl Default for XmlParser {
    fn default() -> Self {
        Self::new()
    }
}

struct ParseState<'i, 'a> {
    index: &'i LineIndex<'a>,
    builder: DocumentBuilder,
    scope: NamespaceScope,
    max_depth: usize,
    root_closed: bool,
}

impl ParseState<'_, '_> {
    fn error_at(&self, offset: usize, message: impl Into<String>) -> Error {
        let (line, column) = self.index.line_column(offset);
        Error::parse(line, column, message)
    }

    fn open(&mut self, tag: &BytesStart<'_>, start: usize, end: usize, empty: bool) -> Result<()> {
        let raw_name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();

        if self.builder.depth() == 0 && self.builder.has_root() {
            return Err(self.error_at(
                start,
                format!("multiple root elements: unexpected <{raw_name}> after the root element"),
            ));
        }
        if self.builder.depth() >= self.max_depth {
            return Err(self.error_at(
                start,
                format!("element nesting exceeds {} levels", self.max_depth),
            ));
        }

        let mut declarations = HashMap::new();
        let mut raw_attributes = Vec::new();
        for attr in tag.attributes() {
            let attr = attr.map_err(|e| self.error_at(start, reader_message(&e)))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| self.error_at(start, reader_message(&e)))?
                .into_owned();
            if key == "xmlns" {
                declarations.insert(String::new(), value.clone());
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                if value.is_empty() {
                    return Err(self.error_at(
                        start,
                        format!("namespace prefix '{prefix}' cannot be bound to an empty URI"),
                    ));
                }
                declarations.insert(prefix.to_string(), value.clone());
            }
            raw_attributes.push((key, value));
        }
        self.scope.push(declarations);

        let name = QName::parse(&raw_name);
        let namespace = match name.prefix.as_deref() {
            Some(prefix) => Some(self.resolve_prefix(prefix, start)?),
            None => self.scope.resolve(None).map(str::to_string),
        };

        let mut element = ElementData::new(name)
            .with_position(self.index.position(start, end.saturating_sub(start)));
        element.namespace = namespace;
        for (key, value) in raw_attributes {
            let name = QName::parse(&key);
            let namespace = match name.prefix.as_deref() {
                Some("xmlns") | None => None,
                Some(prefix) => Some(self.resolve_prefix(prefix, start)?),
            };
            element.attributes.push(Attribute {
                name,
                namespace,
                value,
            });
        }

        trace!(element = %element.name, line = element.position.line, "open element");
        if empty {
            self.builder.empty_element(element);
            self.scope.pop();
            self.after_close();
        } else {
            self.builder.open_element(element);
        }
        Ok(())
    }

    fn resolve_prefix(&self, prefix: &str, offset: usize) -> Result<String> {
        self.scope
            .resolve(Some(prefix))
            .map(str::to_string)
            .ok_or_else(|| self.error_at(offset, format!("unbound namespace prefix '{prefix}'")))
    }

    fn close(&mut self) {
        self.builder.close_element();
        self.scope.pop();
        self.after_close();
    }

    fn after_close(&mut self) {
        if self.builder.depth() == 0 {
            self.root_closed = true;
        }
    }

    fn text(&mut self, text: &str, offset: usize) -> Result<()> {
        if self.builder.depth() == 0 {
            if text.trim().is_empty() {
                return Ok(());
            }
            let message = if self.root_closed {
                "content is not allowed after the root element"
            } else {
                "content is not allowed before the root element"
            };
            return Err(self.error_at(offset, message));
        }
        if text.trim().is_empty() {
            return Ok(());
        }
        self.builder.text(text);
        Ok(())
    }

    fn finish(self, len: usize) -> Result<XmlDocument> {
        if let Some(open) = self.builder.open_name() {
            return Err(self.error_at(len, format!("unexpected end of input: element <{open}> is not closed")));
        }
        if !self.builder.has_root() {
            return Err(self.error_at(len, "document has no root element"));
        }
        Ok(self.builder.finish())
    }
}

fn read_declaration(decl: &BytesDecl<'_>) -> std::result::Result<XmlDeclaration, String> {
    let text = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
    let version = decl.version().map_err(|e| reader_message(&e))?;
    let encoding = decl.encoding().transpose().map_err(|e| reader_message(&e))?;
    let standalone = decl.standalone().transpose().map_err(|e| reader_message(&e))?;
    Ok(XmlDeclaration {
        version: Some(text(&version)),
        encoding: encoding.map(|e| text(&e)),
        standalone: standalone.map(|s| text(&s)),
    })
}

/// Reader error text without the byte offsets quick-xml embeds
/// (`at 1..4: `, `position 8: `); errors carry line and column instead.
fn reader_message(error: &impl std::fmt::Display) -> String {
    let raw = error.to_string();
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw.as_str();
    'scan: while let Some(c) = rest.chars().next() {
        if out.is_empty() || out.ends_with(' ') {
            for marker in ["at position ", "position ", "at "] {
                if let Some(after) = rest.strip_prefix(marker).and_then(skip_offset) {
                    rest = after;
                    continue 'scan;
                }
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out.trim_end_matches([' ', ',']).to_string()
}

/// Skip `12: ` or `1..4: ` (or a bare offset ending the text).
fn skip_offset(text: &str) -> Option<&str> {
    let digits = |t: &str| t.len() - t.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    let n = digits(text);
    if n == 0 {
        return None;
    }
    let mut tail = &text[n..];
    if let Some(range_end) = tail.strip_prefix("..") {
        let m = digits(range_end);
        if m == 0 {
            return None;
        }
        tail = &range_end[m..];
    }
    if tail.is_empty() {
        return Some(tail);
    }
    tail.strip_prefix(": ").or_else(|| tail.strip_prefix(':'))
}

fn is_utf8_compatible(encoding: &str) -> bool {
    matches!(
        encoding.to_ascii_lowercase().as_str(),
        "utf-8" | "utf8" | "us-ascii" | "ascii"
    )
}

#[allow(clippy::cast_possible_truncation)]
fn to_offset(position: u64) -> usize {
    position as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<XmlDocument> {
        XmlParser::new().parse(xml.as_bytes())
    }

    #[test]
    fn test_parse_simple_document() {
        let doc = parse("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Root a=\"1\"><Child>text</Child><Empty/></Root>")
            .unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.local_name(), Some("Root"));
        assert_eq!(root.attribute("a"), Some("1"));
        assert_eq!(root.child("Child").unwrap().text(), "text");
        assert!(root.child("Empty").is_some());
        assert_eq!(doc.declaration().unwrap().version.as_deref(), Some("1.0"));
        assert_eq!(root.position().line, 2);
        assert_eq!(root.position().column, 1);
    }

    #[test]
    fn test_default_and_prefixed_namespaces() {
        let doc = parse(
            "<Root xmlns=\"urn:a\" xmlns:b=\"urn:b\"><b:Item b:code=\"x\"/><Plain xmlns=\"\"/></Root>",
        )
        .unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.namespace(), Some("urn:a"));
        let item = root.child("Item").unwrap();
        assert_eq!(item.namespace(), Some("urn:b"));
        let attr = item.attributes().find(|a| a.name.local == "code").unwrap();
        assert_eq!(attr.namespace.as_deref(), Some("urn:b"));
        assert_eq!(root.child("Plain").unwrap().namespace(), None);
    }

    #[test]
    fn test_whitespace_text_dropped_and_entities_unescaped() {
        let doc = parse("<Root>\n  <A>x &amp; y</A>\n  <B><![CDATA[<raw>]]></B>\n</Root>").unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.children().count(), 2);
        assert_eq!(root.child("A").unwrap().text(), "x & y");
        assert_eq!(root.child("B").unwrap().text(), "<raw>");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = parse("<Root>\n<A></B>\n</Root>").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
        assert_eq!(err.line_column().0, 2);
    }

    #[test]
    fn test_unclosed_element() {
        let err = parse("<Root>\n  <A>text</A>\n").unwrap_err();
        assert!(err.message().contains("<Root>"), "{err}");
    }

    #[test]
    fn test_multiple_roots() {
        let err = parse("<A/>\n<B/>").unwrap_err();
        assert!(err.message().contains("multiple root"));
        assert_eq!(err.line_column(), (2, 1));
    }

    #[test]
    fn test_text_outside_root() {
        assert!(parse("junk<A/>").is_err());
        assert!(parse("<A/>junk").is_err());
        assert!(parse("  <A/>  \n").is_ok());
    }

    #[test]
    fn test_empty_input_has_no_root() {
        let err = parse("").unwrap_err();
        assert!(err.message().contains("no root"));
        assert!(parse("<?xml version=\"1.0\"?><!-- only a comment -->").is_err());
    }

    #[test]
    fn test_unbound_prefix() {
        let err = parse("<Root><x:Item/></Root>").unwrap_err();
        assert!(err.message().contains("unbound namespace prefix 'x'"));
        assert!(parse("<Root x:attr=\"1\"/>").is_err());
    }

    #[test]
    fn test_duplicate_attribute() {
        let err = parse("<Root a=\"1\" a=\"2\"/>").unwrap_err();
        assert!(err.message().contains("duplicated attribute"), "{err}");
        assert!(!err.message().contains("position"), "{err}");
    }

    #[test]
    fn test_undefined_entity() {
        let err = parse("<Root>\n<A>&nbsp;</A></Root>").unwrap_err();
        assert_eq!(err.message(), "unrecognized entity `nbsp`");
        assert_eq!(err.line_column().0, 2);
    }

    #[test]
    fn test_reader_offsets_stripped() {
        assert_eq!(
            reader_message(&"position 8: attribute value must be enclosed in `\"` or `'`"),
            "attribute value must be enclosed in `\"` or `'`"
        );
        assert_eq!(
            reader_message(&"position 3: duplicated attribute, previous declaration at position 1"),
            "duplicated attribute, previous declaration"
        );
        assert_eq!(
            reader_message(&"at 1..4: unrecognized entity `foo`"),
            "unrecognized entity `foo`"
        );
        assert_eq!(
            reader_message(&"syntax error: tag not closed: `>` not found before end of input"),
            "syntax error: tag not closed: `>` not found before end of input"
        );
        assert_eq!(reader_message(&"format 12 is wrong"), "format 12 is wrong");
    }

    #[test]
    fn test_invalid_utf8() {
        let err = XmlParser::new().parse(b"<Root>\n\xFF</Root>").unwrap_err();
        assert!(matches!(err, Error::Encoding { .. }));
        assert_eq!(err.line_column(), (2, 1));
    }

    #[test]
    fn test_bom_is_skipped() {
        let doc = XmlParser::new().parse(b"\xEF\xBB\xBF<Root/>").unwrap();
        assert_eq!(doc.root().unwrap().local_name(), Some("Root"));
    }

    #[test]
    fn test_max_depth() {
        let parser = XmlParser::new().with_max_depth(2);
        assert!(parser.parse(b"<a><b/></a>").is_ok());
        assert!(parser.parse(b"<a><b><c/></b></a>").is_err());
    }
}
