//! Schema document → [`XsdSchema`]

use std::collections::HashMap;

use mits_ir::NodeRef;
use regex::Regex;
use tracing::{debug, trace};

use super::{
    AttributeDecl, BuiltinType, ComplexType, Compositor, Content, ElementDecl, MaxOccurs, ModelGroup,
    Occurs, Particle, SimpleType, TypeRef, XS_NAMESPACE, XsdSchema,
};
use crate::{Error, Result};

pub(super) fn compile(bytes: &[u8]) -> Result<XsdSchema> {
    let doc = mits_adapter_xml::parse(bytes)?;
    let root = doc
        .root()
        .ok_or_else(|| Error::invalid_schema("document has no root element"))?;
    if root.local_name() != Some("schema") || root.namespace() != Some(XS_NAMESPACE) {
        return Err(Error::invalid_schema(format!(
            "root element must be xs:schema, found <{}>",
            root.name().map(ToString::to_string).unwrap_or_default()
        )));
    }

    let mut compiler = Compiler::default();
    compiler.schema.target_namespace = root.attribute("targetNamespace").map(str::to_string);

    // Reserve slots for named types so references may point forward.
    for child in root.child_elements() {
        let Some(name) = child.attribute("name") else {
            continue;
        };
        match child.local_name() {
            Some("simpleType") => {
                compiler.named_simple.insert(name.to_string(), compiler.schema.simple_types.len());
                compiler.schema.simple_types.push(SimpleType::default());
            }
            Some("complexType") => {
                compiler
                    .named_complex
                    .insert(name.to_string(), compiler.schema.complex_types.len());
                compiler.schema.complex_types.push(ComplexType::default());
            }
            _ => {}
        }
    }

    for child in root.child_elements() {
        match child.local_name() {
            Some("simpleType") => {
                let st = compiler.simple_type(child)?;
                if let Some(&idx) = st.name.as_ref().and_then(|n| compiler.named_simple.get(n)) {
                    compiler.schema.simple_types[idx] = st;
                }
            }
            Some("complexType") => {
                let ct = compiler.complex_type(child)?;
                if let Some(&idx) = ct.name.as_ref().and_then(|n| compiler.named_complex.get(n)) {
                    compiler.schema.complex_types[idx] = ct;
                }
            }
            Some("element") => {
                let decl = compiler.element(child)?;
                compiler.schema.elements.insert(decl.name.clone(), decl);
            }
            Some("annotation") => {}
            Some(other) => debug!(construct = other, "unsupported top-level schema construct ignored"),
            None => {}
        }
    }

    compiler.check_element_refs()?;
    debug!(
        elements = compiler.schema.elements.len(),
        simple_types = compiler.schema.simple_types.len(),
        complex_types = compiler.schema.complex_types.len(),
        "schema compiled"
    );
    Ok(compiler.schema)
}

#[derive(Default)]
struct Compiler {
    schema: XsdSchema,
    named_simple: HashMap<String, usize>,
    named_complex: HashMap<String, usize>,
    element_refs: Vec<String>,
}

impl Compiler {
    fn element(&mut self, node: NodeRef<'_>) -> Result<ElementDecl> {
        let occurs = occurs(node)?;
        if let Some(reference) = node.attribute("ref") {
            let name = local_part(reference).to_string();
            self.element_refs.push(name.clone());
            return Ok(ElementDecl {
                type_ref: TypeRef::Element(name.clone()),
                name,
                occurs,
            });
        }

        let name = node
            .attribute("name")
            .ok_or_else(|| Error::invalid_schema("xs:element without name or ref"))?
            .to_string();

        let type_ref = if let Some(ty) = node.attribute("type") {
            self.resolve_type(node, ty)?
        } else if let Some(ct) = xs_child(node, "complexType") {
            let ct = self.complex_type(ct)?;
            self.schema.complex_types.push(ct);
            TypeRef::Complex(self.schema.complex_types.len() - 1)
        } else if let Some(st) = xs_child(node, "simpleType") {
            let st = self.simple_type(st)?;
            self.schema.simple_types.push(st);
            TypeRef::Simple(self.schema.simple_types.len() - 1)
        } else {
            TypeRef::Builtin(BuiltinType::AnyType)
        };

        trace!(element = %name, "compiled element declaration");
        Ok(ElementDecl {
            name,
            occurs,
            type_ref,
        })
    }

    fn complex_type(&mut self, node: NodeRef<'_>) -> Result<ComplexType> {
        let mut ct = ComplexType {
            name: node.attribute("name").map(str::to_string),
            mixed: node.attribute("mixed") == Some("true"),
            ..ComplexType::default()
        };

        for child in node.child_elements() {
            match child.local_name() {
                Some("sequence" | "choice" | "all") => {
                    ct.content = Content::Elements(self.group(child)?);
                }
                Some("attribute") => ct.attributes.push(self.attribute(child)?),
                Some("anyAttribute") => ct.any_attribute = true,
                Some("simpleContent") => {
                    let derivation = child
                        .child_elements()
                        .find(|c| matches!(c.local_name(), Some("extension" | "restriction")))
                        .ok_or_else(|| Error::invalid_schema("xs:simpleContent without extension"))?;
                    let base = derivation
                        .attribute("base")
                        .ok_or_else(|| Error::invalid_schema("xs:extension without base"))?;
                    ct.content = Content::Simple(self.resolve_type(derivation, base)?);
                    for attr in derivation.child_elements() {
                        match attr.local_name() {
                            Some("attribute") => ct.attributes.push(self.attribute(attr)?),
                            Some("anyAttribute") => ct.any_attribute = true,
                            _ => {}
                        }
                    }
                }
                Some("annotation") => {}
                Some(other) => debug!(construct = other, "unsupported complexType content ignored"),
                None => {}
            }
        }
        Ok(ct)
    }

    fn group(&mut self, node: NodeRef<'_>) -> Result<ModelGroup> {
        let compositor = match node.local_name() {
            Some("choice") => Compositor::Choice,
            Some("all") => Compositor::All,
            _ => Compositor::Sequence,
        };
        let mut particles = Vec::new();
        for child in node.child_elements() {
            match child.local_name() {
                Some("element") => particles.push(Particle::Element(self.element(child)?)),
                Some("sequence" | "choice" | "all") => particles.push(Particle::Group(self.group(child)?)),
                Some("any") => particles.push(Particle::Any(occurs(child)?)),
                Some("annotation") => {}
                Some(other) => debug!(construct = other, "unsupported model group particle ignored"),
                None => {}
            }
        }
        Ok(ModelGroup {
            compositor,
            occurs: occurs(node)?,
            particles,
        })
    }

    fn attribute(&mut self, node: NodeRef<'_>) -> Result<AttributeDecl> {
        let name = node
            .attribute("name")
            .or_else(|| node.attribute("ref").map(local_part))
            .ok_or_else(|| Error::invalid_schema("xs:attribute without name or ref"))?
            .to_string();
        let type_ref = if let Some(ty) = node.attribute("type") {
            self.resolve_type(node, ty)?
        } else if let Some(st) = xs_child(node, "simpleType") {
            let st = self.simple_type(st)?;
            self.schema.simple_types.push(st);
            TypeRef::Simple(self.schema.simple_types.len() - 1)
        } else {
            TypeRef::Builtin(BuiltinType::AnySimpleType)
        };
        Ok(AttributeDecl {
            name,
            required: node.attribute("use") == Some("required"),
            type_ref,
        })
    }

    fn simple_type(&mut self, node: NodeRef<'_>) -> Result<SimpleType> {
        let mut st = SimpleType {
            name: node.attribute("name").map(str::to_string),
            ..SimpleType::default()
        };
        let Some(restriction) = xs_child(node, "restriction") else {
            debug!(name = ?st.name, "simpleType without restriction treated as anySimpleType");
            return Ok(st);
        };

        st.base = if let Some(base) = restriction.attribute("base") {
            self.resolve_type(restriction, base)?
        } else if let Some(inner) = xs_child(restriction, "simpleType") {
            let inner = self.simple_type(inner)?;
            self.schema.simple_types.push(inner);
            TypeRef::Simple(self.schema.simple_types.len() - 1)
        } else {
            return Err(Error::invalid_schema("xs:restriction without base"));
        };

        for facet in restriction.child_elements() {
            let Some(kind) = facet.local_name() else {
                continue;
            };
            let value = facet.attribute("value");
            let require = || value.ok_or_else(|| Error::invalid_schema(format!("xs:{kind} without value")));
            match kind {
                "enumeration" => st.facets.enumeration.push(require()?.to_string()),
                "pattern" => {
                    let pattern = require()?;
                    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
                        Error::invalid_schema(format!("invalid pattern '{pattern}': {e}"))
                    })?;
                    st.facets.patterns.push(regex);
                }
                "length" => st.facets.length = Some(parse_number(kind, require()?)?),
                "minLength" => st.facets.min_length = Some(parse_number(kind, require()?)?),
                "maxLength" => st.facets.max_length = Some(parse_number(kind, require()?)?),
                "minInclusive" => st.facets.min_inclusive = Some(parse_number(kind, require()?)?),
                "maxInclusive" => st.facets.max_inclusive = Some(parse_number(kind, require()?)?),
                "minExclusive" => st.facets.min_exclusive = Some(parse_number(kind, require()?)?),
                "maxExclusive" => st.facets.max_exclusive = Some(parse_number(kind, require()?)?),
                "simpleType" | "annotation" => {}
                other => debug!(facet = other, "unsupported facet ignored"),
            }
        }
        Ok(st)
    }

    /// Resolve a `type`/`base` attribute value written as a QName.
    fn resolve_type(&self, context: NodeRef<'_>, raw: &str) -> Result<TypeRef> {
        let (prefix, local) = match raw.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, raw),
        };
        if namespace_for(context, prefix).as_deref() == Some(XS_NAMESPACE) {
            return BuiltinType::from_local_name(local)
                .map(TypeRef::Builtin)
                .ok_or_else(|| Error::invalid_schema(format!("unsupported built-in type '{raw}'")));
        }
        if let Some(&idx) = self.named_complex.get(local) {
            return Ok(TypeRef::Complex(idx));
        }
        if let Some(&idx) = self.named_simple.get(local) {
            return Ok(TypeRef::Simple(idx));
        }
        // Unprefixed built-in names in a schema without a default namespace
        if prefix.is_none() {
            if let Some(b) = BuiltinType::from_local_name(local) {
                return Ok(TypeRef::Builtin(b));
            }
        }
        Err(Error::invalid_schema(format!("type '{raw}' is not defined")))
    }

    fn check_element_refs(&self) -> Result<()> {
        match self
            .element_refs
            .iter()
            .find(|name| !self.schema.elements.contains_key(*name))
        {
            Some(missing) => Err(Error::invalid_schema(format!(
                "element reference '{missing}' has no global declaration"
            ))),
            None => Ok(()),
        }
    }
}

fn xs_child<'a>(node: NodeRef<'a>, local: &str) -> Option<NodeRef<'a>> {
    node.child_elements().find(|c| c.local_name() == Some(local))
}

fn local_part(raw: &str) -> &str {
    raw.rsplit_once(':').map_or(raw, |(_, l)| l)
}

/// Namespace bound to `prefix` (or the default namespace) where `node` sits.
fn namespace_for(node: NodeRef<'_>, prefix: Option<&str>) -> Option<String> {
    let mut current = Some(node);
    while let Some(n) = current {
        for attr in n.namespace_declarations() {
            let declared = match attr.name.prefix.as_deref() {
                Some("xmlns") => Some(attr.name.local.as_str()),
                _ => None,
            };
            if declared == prefix {
                return Some(attr.value.clone()).filter(|v| !v.is_empty());
            }
        }
        current = n.parent().filter(mits_ir::NodeRef::is_element);
    }
    None
}

fn occurs(node: NodeRef<'_>) -> Result<Occurs> {
    let min = match node.attribute("minOccurs") {
        Some(v) => parse_number("minOccurs", v)?,
        None => 1,
    };
    let max = match node.attribute("maxOccurs") {
        Some("unbounded") => MaxOccurs::Unbounded,
        Some(v) => MaxOccurs::Bounded(parse_number("maxOccurs", v)?),
        None => MaxOccurs::Bounded(1),
    };
    Ok(Occurs { min, max })
}

fn parse_number<T: std::str::FromStr>(what: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::invalid_schema(format!("invalid {what} value '{value}'")))
}
