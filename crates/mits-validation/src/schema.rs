//! Schema stage
//!
//! Validates the parsed tree against the compiled XSD subset. Child content
//! is matched greedily against the content model, which is exact for the
//! deterministic models schemas are required to have. Matching stops at the
//! first violation inside one parent, but children matched before it are
//! still validated.

use mits_findings::{Finding, Location, codes};
use mits_ir::{NodeRef, XmlDocument};
use mits_schema::xsd::{
    BuiltinType, ComplexType, Compositor, Content, ElementDecl, MaxOccurs, ModelGroup, Occurs, Particle,
    TypeRef,
};
use mits_schema::{ArtifactCache, Availability, RulesLayout, XsdSchema};
use tracing::{debug, warn};

use crate::Result;
use crate::stage::{Stage, StageInput, StageKind};

const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Structure and simple-value validation against the version's schema
#[derive(Debug, Clone)]
pub struct SchemaStage {
    schema: Availability<XsdSchema>,
}

impl SchemaStage {
    pub fn new(schema: Availability<XsdSchema>) -> Self {
        Self { schema }
    }

    /// Load the schema of a rules version through a shared cache.
    pub fn load(layout: &RulesLayout, cache: &ArtifactCache<XsdSchema>) -> Self {
        let path = layout.xsd_file();
        let schema = cache.load(&path, XsdSchema::compile);
        if let Some(reason) = schema.failure() {
            warn!(path = %path.display(), reason, "schema failed to compile");
        }
        Self::new(schema)
    }

    #[must_use]
    pub fn schema(&self) -> &Availability<XsdSchema> {
        &self.schema
    }
}

impl Stage for SchemaStage {
    fn kind(&self) -> StageKind {
        StageKind::Schema
    }

    fn validate(&self, input: &StageInput<'_>) -> Result<Vec<Finding>> {
        let schema = match &self.schema {
            Availability::Available(schema) => schema,
            Availability::Missing => {
                return Ok(vec![Finding::new(
                    codes::XSD_SCHEMA_MISSING,
                    "No XSD schema installed for this catalog version; schema checks skipped",
                )]);
            }
            Availability::ParseFailed(reason) => {
                return Ok(vec![Finding::new(
                    codes::XSD_SCHEMA_PARSE_ERROR,
                    format!("XSD schema could not be loaded: {reason}"),
                )]);
            }
        };
        let Some(document) = input.document else {
            debug!("no parsed document; schema checks skipped");
            return Ok(Vec::new());
        };
        Ok(Validator::new(schema).document(document))
    }
}

/// A constraint violation before it becomes a finding
struct Violation<'d> {
    node: NodeRef<'d>,
    message: String,
}

impl<'d> Violation<'d> {
    fn new(node: NodeRef<'d>, message: impl Into<String>) -> Self {
        Self {
            node,
            message: message.into(),
        }
    }

    fn into_finding(self) -> Finding {
        let position = self.node.position();
        let mut location = Location::path(self.node.path());
        if position.line > 0 {
            location = location.with_line_column(position.line, position.column);
        }
        Finding::new(codes::XSD_VALIDATION_ERROR, self.message).with_location(location)
    }
}

struct Validator<'s> {
    schema: &'s XsdSchema,
}

impl<'s> Validator<'s> {
    fn new(schema: &'s XsdSchema) -> Self {
        Self { schema }
    }

    fn document(&self, document: &XmlDocument) -> Vec<Finding> {
        let Some(root) = document.root() else {
            return Vec::new();
        };
        let mut violations = Vec::new();
        let name = root.local_name().unwrap_or_default();

        if let Some(target) = self.schema.target_namespace.as_deref() {
            if root.namespace() != Some(target) {
                violations.push(Violation::new(
                    root,
                    format!(
                        "Element '{name}': namespace '{}' does not match the schema target namespace '{target}'",
                        root.namespace().unwrap_or_default()
                    ),
                ));
            }
        }

        match self.schema.global_element(name) {
            Some(decl) => self.element(root, &decl.type_ref, &mut violations),
            None => violations.push(Violation::new(
                root,
                format!("Element '{name}': No matching global declaration available for the validation root"),
            )),
        }

        debug!(violations = violations.len(), "schema validation finished");
        violations.into_iter().map(Violation::into_finding).collect()
    }

    fn element<'d>(&self, node: NodeRef<'d>, type_ref: &TypeRef, out: &mut Vec<Violation<'d>>) {
        let name = node.local_name().unwrap_or_default();
        let resolved = self.schema.resolve(type_ref);

        if matches!(resolved, TypeRef::Builtin(BuiltinType::AnyType)) {
            return;
        }

        let Some(complex) = self.schema.complex_type(resolved) else {
            // Simple type: text only, no attributes
            for attr in node.attributes().filter(|a| !is_instance_attribute(a.namespace.as_deref())) {
                out.push(Violation::new(
                    node,
                    format!("Element '{name}', attribute '{}': The attribute is not allowed", attr.name),
                ));
            }
            if node.child_elements().next().is_some() {
                out.push(Violation::new(
                    node,
                    format!("Element '{name}': Element content is not allowed, because the type is a simple type"),
                ));
                return;
            }
            self.value(node, resolved, &node.text(), out);
            return;
        };

        self.attributes(node, complex, out);

        match &complex.content {
            Content::Empty => {
                if node.child_elements().next().is_some() {
                    out.push(Violation::new(
                        node,
                        format!("Element '{name}': Element content is not allowed, because the content type is empty"),
                    ));
                } else if !complex.mixed && !node.text().trim().is_empty() {
                    out.push(Violation::new(
                        node,
                        format!("Element '{name}': Character content is not allowed, because the content type is empty"),
                    ));
                }
            }
            Content::Simple(value_type) => {
                if node.child_elements().next().is_some() {
                    out.push(Violation::new(
                        node,
                        format!("Element '{name}': Element content is not allowed, because the content type is a simple type"),
                    ));
                } else {
                    self.value(node, value_type, &node.text(), out);
                }
            }
            Content::Elements(group) => {
                if !complex.mixed && !node.text().trim().is_empty() {
                    out.push(Violation::new(
                        node,
                        format!("Element '{name}': Character content other than whitespace is not allowed"),
                    ));
                }
                let children: Vec<_> = node.child_elements().collect();
                let mut matcher = Matcher::new(node, &children);
                if let Err(violation) = matcher.content(group) {
                    out.push(violation);
                }
                for (child, decl) in matcher.assigned {
                    if let Some(decl) = decl {
                        self.element(child, &decl.type_ref, out);
                    }
                }
            }
        }
    }

    fn attributes<'d>(
        &self,
        node: NodeRef<'d>,
        complex: &ComplexType,
        out: &mut Vec<Violation<'d>>,
    ) {
        let name = node.local_name().unwrap_or_default();
        for attr in node.attributes() {
            if is_instance_attribute(attr.namespace.as_deref()) {
                continue;
            }
            match complex.attribute(&attr.name.local) {
                Some(decl) => {
                    if let Err(reason) = self.schema.check_value(&decl.type_ref, &attr.value) {
                        out.push(Violation::new(
                            node,
                            format!("Element '{name}', attribute '{}': {reason}", attr.name),
                        ));
                    }
                }
                None if complex.any_attribute => {}
                None => out.push(Violation::new(
                    node,
                    format!("Element '{name}', attribute '{}': The attribute is not allowed", attr.name),
                )),
            }
        }
        for decl in complex.attributes.iter().filter(|a| a.required) {
            if node.attribute(&decl.name).is_none() {
                out.push(Violation::new(
                    node,
                    format!("Element '{name}': The attribute '{}' is required but missing", decl.name),
                ));
            }
        }
    }

    fn value<'d>(&self, node: NodeRef<'d>, type_ref: &TypeRef, text: &str, out: &mut Vec<Violation<'d>>) {
        if let Err(reason) = self.schema.check_value(type_ref, text) {
            let name = node.local_name().unwrap_or_default();
            out.push(Violation::new(node, format!("Element '{name}': {reason}")));
        }
    }
}

fn is_instance_attribute(namespace: Option<&str>) -> bool {
    namespace == Some(XSI_NAMESPACE)
}

/// Greedy matcher of a parent's child elements against a content model
struct Matcher<'d, 'c, 's> {
    parent: NodeRef<'d>,
    children: &'c [NodeRef<'d>],
    pos: usize,
    /// Consumed children with the declaration they matched (`None` for wildcards)
    assigned: Vec<(NodeRef<'d>, Option<&'s ElementDecl>)>,
    /// Element particles that reached their `maxOccurs`
    saturated: Vec<(&'s str, Occurs)>,
}

type Matched<'d> = std::result::Result<bool, Violation<'d>>;

impl<'d, 'c, 's> Matcher<'d, 'c, 's> {
    fn new(parent: NodeRef<'d>, children: &'c [NodeRef<'d>]) -> Self {
        Self {
            parent,
            children,
            pos: 0,
            assigned: Vec::new(),
            saturated: Vec::new(),
        }
    }

    fn content(&mut self, group: &'s ModelGroup) -> std::result::Result<(), Violation<'d>> {
        self.repeat(group.occurs, group_emptiable(group), &expected_group(group), |m| {
            m.group_once(group)
        })?;

        if let Some(extra) = self.peek() {
            let name = extra.local_name().unwrap_or_default();
            let message = match self.saturated.iter().find(|(n, _)| *n == name) {
                Some((_, occurs)) => format!(
                    "Element '{name}': This element occurs more often than allowed (maxOccurs {})",
                    max_label(*occurs)
                ),
                None => format!("Element '{name}': This element is not expected"),
            };
            return Err(Violation::new(extra, message));
        }
        Ok(())
    }

    fn peek(&self) -> Option<NodeRef<'d>> {
        self.children.get(self.pos).copied()
    }

    fn peek_name(&self) -> Option<&'d str> {
        self.peek().and_then(|n| n.local_name())
    }

    /// Match `once` as often as `occurs` allows; returns the occurrence count.
    fn repeat<F>(&mut self, occurs: Occurs, emptiable: bool, expected: &[&str], mut once: F) -> std::result::Result<u32, Violation<'d>>
    where
        F: FnMut(&mut Self) -> Matched<'d>,
    {
        let mut count = 0;
        while occurs.max.allows(count + 1) {
            if !once(self)? {
                break;
            }
            count += 1;
        }
        if count < occurs.min && !(count == 0 && emptiable) {
            return Err(self.missing(expected));
        }
        Ok(count)
    }

    fn missing(&self, expected: &[&str]) -> Violation<'d> {
        let list = expected.join(", ");
        match self.peek() {
            Some(found) => Violation::new(
                found,
                format!(
                    "Element '{}': This element is not expected. Expected is ( {list} )",
                    found.local_name().unwrap_or_default()
                ),
            ),
            None => Violation::new(
                self.parent,
                format!(
                    "Element '{}': Missing child element(s). Expected is ( {list} )",
                    self.parent.local_name().unwrap_or_default()
                ),
            ),
        }
    }

    fn particle(&mut self, particle: &'s Particle) -> Matched<'d> {
        let occurs = particle.occurs();
        let count = self.repeat(occurs, particle_emptiable(particle), &expected_particle(particle), |m| {
            m.particle_once(particle)
        })?;
        if let Particle::Element(decl) = particle {
            if count > 0 && !occurs.max.allows(count + 1) {
                self.saturated.push((decl.name.as_str(), occurs));
            }
        }
        Ok(count > 0)
    }

    fn particle_once(&mut self, particle: &'s Particle) -> Matched<'d> {
        match particle {
            Particle::Element(decl) => {
                let Some(child) = self.peek().filter(|c| c.local_name() == Some(decl.name.as_str())) else {
                    return Ok(false);
                };
                self.assigned.push((child, Some(decl)));
                self.pos += 1;
                Ok(true)
            }
            Particle::Any(_) => {
                let Some(child) = self.peek() else {
                    return Ok(false);
                };
                self.assigned.push((child, None));
                self.pos += 1;
                Ok(true)
            }
            Particle::Group(group) => self.group_once(group),
        }
    }

    fn group_once(&mut self, group: &'s ModelGroup) -> Matched<'d> {
        let Some(next) = self.peek_name() else {
            return Ok(false);
        };
        if !group_starts(group, next) {
            return Ok(false);
        }
        let start = self.pos;
        match group.compositor {
            Compositor::Sequence => {
                for particle in &group.particles {
                    self.particle(particle)?;
                }
            }
            Compositor::Choice => {
                if let Some(particle) = group.particles.iter().find(|p| particle_starts(p, next)) {
                    self.particle(particle)?;
                }
            }
            Compositor::All => self.all(group)?,
        }
        Ok(self.pos > start)
    }

    fn all(&mut self, group: &'s ModelGroup) -> std::result::Result<(), Violation<'d>> {
        let mut seen = vec![false; group.particles.len()];
        while let Some(next) = self.peek_name() {
            let Some(idx) = (0..group.particles.len())
                .find(|&i| !seen[i] && particle_starts(&group.particles[i], next))
            else {
                break;
            };
            seen[idx] = true;
            self.particle_once(&group.particles[idx])?;
        }
        let missing: Vec<&str> = group
            .particles
            .iter()
            .zip(&seen)
            .filter(|(p, seen)| !**seen && !particle_emptiable(p))
            .flat_map(|(p, _)| expected_particle(p))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(self.missing(&missing))
        }
    }
}

fn particle_starts(particle: &Particle, name: &str) -> bool {
    match particle {
        Particle::Element(decl) => decl.name == name,
        Particle::Any(_) => true,
        Particle::Group(group) => group_starts(group, name),
    }
}

fn group_starts(group: &ModelGroup, name: &str) -> bool {
    match group.compositor {
        Compositor::Sequence => {
            for particle in &group.particles {
                if particle_starts(particle, name) {
                    return true;
                }
                if !particle_emptiable(particle) {
                    return false;
                }
            }
            false
        }
        Compositor::Choice | Compositor::All => group.particles.iter().any(|p| particle_starts(p, name)),
    }
}

fn particle_emptiable(particle: &Particle) -> bool {
    particle.occurs().min == 0
        || match particle {
            Particle::Group(group) => group_emptiable(group),
            Particle::Element(_) | Particle::Any(_) => false,
        }
}

fn group_emptiable(group: &ModelGroup) -> bool {
    match group.compositor {
        Compositor::Sequence | Compositor::All => group.particles.iter().all(particle_emptiable),
        Compositor::Choice => group.particles.iter().any(particle_emptiable),
    }
}

/// Names that could start `particle`, for messages.
fn expected_particle(particle: &Particle) -> Vec<&str> {
    match particle {
        Particle::Element(decl) => vec![decl.name.as_str()],
        Particle::Any(_) => vec!["##any"],
        Particle::Group(group) => expected_group(group),
    }
}

fn expected_group(group: &ModelGroup) -> Vec<&str> {
    let mut names = Vec::new();
    match group.compositor {
        Compositor::Sequence => {
            for particle in &group.particles {
                names.extend(expected_particle(particle));
                if !particle_emptiable(particle) {
                    break;
                }
            }
        }
        Compositor::Choice | Compositor::All => {
            for particle in &group.particles {
                names.extend(expected_particle(particle));
            }
        }
    }
    names
}

fn max_label(occurs: Occurs) -> String {
    match occurs.max {
        MaxOccurs::Bounded(n) => n.to_string(),
        MaxOccurs::Unbounded => "unbounded".to_string(),
    }
}
