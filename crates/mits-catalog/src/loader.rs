//! Versioned catalog loading with per-file isolation

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use jsonschema::Validator;
use mits_findings::{codes, Finding, Location};
use mits_schema::RulesLayout;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::entry::{CatalogEntry, ItemSpecialization};
use crate::registry::CatalogRegistry;
use crate::{Error, Result};

const CHARGE_CLASSES_SCHEMA: &str = "charge-classes";
const ENUM_SCHEMA: &str = "enum";

/// Builds a [`CatalogRegistry`] for one version of a rules tree
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    layout: RulesLayout,
}

impl CatalogLoader {
    pub fn new(layout: RulesLayout) -> Self {
        Self { layout }
    }

    #[must_use]
    pub fn layout(&self) -> &RulesLayout {
        &self.layout
    }

    /// Load every catalog of the configured version.
    ///
    /// Never fails: each problem is reported as a finding and only affects
    /// the file it was found in. The registry may be partially populated.
    #[must_use]
    pub fn load(&self) -> (CatalogRegistry, Vec<Finding>) {
        let start = Instant::now();
        let mut registry = CatalogRegistry::empty(self.layout.version(), self.layout.root());
        let mut run = LoadRun::new(&self.layout);

        if self.layout.exists() {
            run.charge_classes(&mut registry);
            run.enums(&mut registry);
            run.specializations(&mut registry);
        } else {
            let dir = self.layout.version_dir();
            run.findings.push(
                Finding::new(
                    codes::CATALOG_VERSION_NOT_FOUND,
                    format!(
                        "Catalog version '{}' not found under {}",
                        self.layout.version(),
                        self.layout.root().display()
                    ),
                )
                .with_location(file_location(&dir)),
            );
        }

        registry.metadata.load_duration = start.elapsed();
        info!(
            version = self.layout.version(),
            charge_classes = registry.charge_class_count(),
            enums = registry.enum_count(),
            specializations = registry.specialization_count(),
            findings = run.findings.len(),
            duration_ms = registry.metadata.load_duration.as_millis(),
            "catalogs loaded"
        );
        (registry, run.findings)
    }
}

/// State of a single load: collected findings and compiled structural schemas
struct LoadRun<'a> {
    layout: &'a RulesLayout,
    validators: HashMap<String, Option<Validator>>,
    findings: Vec<Finding>,
}

impl<'a> LoadRun<'a> {
    fn new(layout: &'a RulesLayout) -> Self {
        Self {
            layout,
            validators: HashMap::new(),
            findings: Vec::new(),
        }
    }

    fn charge_classes(&mut self, registry: &mut CatalogRegistry) {
        let path = self.layout.charge_classes_file();
        if !path.is_file() {
            self.findings.push(
                Finding::new(
                    codes::CATALOG_FILE_MISSING,
                    format!("Charge classes file not found: {}", path.display()),
                )
                .with_location(file_location(&path)),
            );
            return;
        }
        if let Some(entries) = self.entry_file(&path, CHARGE_CLASSES_SCHEMA, "charge classes") {
            registry.charge_classes = self.unique(&path, "charge class", entries);
        }
    }

    fn enums(&mut self, registry: &mut CatalogRegistry) {
        let dir = self.layout.enums_dir();
        let Some(files) = self.catalog_files(&dir, "Enums", codes::CATALOG_NO_ENUMS) else {
            return;
        };
        for (name, path) in files {
            let label = format!("enum {name}");
            if let Some(entries) = self.entry_file(&path, ENUM_SCHEMA, &label) {
                let entries = self.unique(&path, &label, entries);
                registry.enums.insert(name, entries);
            }
        }
    }

    fn specializations(&mut self, registry: &mut CatalogRegistry) {
        let dir = self.layout.specializations_dir();
        let Some(files) = self.catalog_files(&dir, "Specializations", codes::CATALOG_NO_SPECIALIZATIONS) else {
            return;
        };
        for (name, path) in files {
            let label = format!("specialization {name}");
            let Some(value) = self.checked_value(&path, &name, &label) else {
                continue;
            };
            match ItemSpecialization::from_value(&value) {
                Ok(spec) => {
                    registry.specializations.insert(name, spec);
                }
                Err(e) => self.invalid_json(&path, &label, &e),
            }
        }
    }

    /// `*.json` files of a catalog directory keyed by file stem, in name order.
    fn catalog_files(&mut self, dir: &Path, kind: &str, empty_code: &str) -> Option<BTreeMap<String, PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "catalog directory unreadable");
                self.findings.push(
                    Finding::new(
                        codes::CATALOG_DIRECTORY_MISSING,
                        format!("{kind} directory not found: {}", dir.display()),
                    )
                    .with_location(file_location(dir)),
                );
                return None;
            }
        };

        let files: BTreeMap<String, PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let stem = p.file_stem()?.to_str()?.to_string();
                Some((stem, p))
            })
            .collect();

        if files.is_empty() {
            self.findings.push(
                Finding::new(empty_code, format!("No catalog files found in: {}", dir.display()))
                    .with_location(file_location(dir)),
            );
            return None;
        }
        Some(files)
    }

    /// Read and structurally check a file holding an array of entries.
    fn entry_file(&mut self, path: &Path, schema: &str, label: &str) -> Option<Vec<CatalogEntry>> {
        let value = self.checked_value(path, schema, label)?;
        match parse_entries(&value) {
            Ok(entries) => Some(entries),
            Err(e) => {
                self.invalid_json(path, label, &e);
                None
            }
        }
    }

    /// Parse a file and run its structural schema, reporting any failure.
    fn checked_value(&mut self, path: &Path, schema: &str, label: &str) -> Option<Value> {
        let value = match read_json(path) {
            Ok(value) => value,
            Err(e) => {
                self.invalid_json(path, label, &e);
                return None;
            }
        };

        if let Some(violation) = self.structural_violation(schema, &value) {
            warn!(file = %path.display(), %violation, "catalog file failed structural check");
            self.findings.push(
                Finding::new(
                    codes::CATALOG_SCHEMA_VALIDATION_ERROR,
                    format!("{} schema validation failed: {violation}", capitalize(label)),
                )
                .with_location(file_location(path))
                .with_rule_reference(format!("schema://{schema}.schema.json")),
            );
            return None;
        }
        Some(value)
    }

    /// First violation of the named structural schema, if the schema exists.
    fn structural_violation(&mut self, schema: &str, value: &Value) -> Option<String> {
        let layout = self.layout;
        let validator = self
            .validators
            .entry(schema.to_string())
            .or_insert_with(|| compile_schema(&layout.catalog_schema(schema)))
            .as_ref()?;
        validator.iter_errors(value).next().map(|e| {
            let at = e.instance_path.to_string();
            if at.is_empty() {
                e.to_string()
            } else {
                format!("{e} (at {at})")
            }
        })
    }

    /// Keep the first entry for each code and report the rest.
    fn unique(&mut self, path: &Path, label: &str, entries: Vec<CatalogEntry>) -> BTreeMap<String, CatalogEntry> {
        let mut seen = HashSet::new();
        let mut accepted = BTreeMap::new();
        for entry in entries {
            if !seen.insert(entry.code.clone()) {
                self.findings.push(
                    Finding::new(
                        codes::CATALOG_DUPLICATE_CODE,
                        format!("Duplicate {label} code: {}", entry.code),
                    )
                    .with_location(file_location(path).with_value(entry.code.clone())),
                );
                continue;
            }
            accepted.insert(entry.code.clone(), entry);
        }
        accepted
    }

    fn invalid_json(&mut self, path: &Path, label: &str, error: &Error) {
        warn!(file = %path.display(), %error, "catalog file skipped");
        self.findings.push(
            Finding::new(codes::CATALOG_INVALID_JSON, format!("Failed to load {label}: {error}"))
                .with_location(file_location(path)),
        );
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let display = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| Error::io(&display, e))?;
    serde_json::from_slice(&bytes).map_err(|e| Error::json(display, e))
}

fn parse_entries(value: &Value) -> Result<Vec<CatalogEntry>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::invalid_entry("catalog file must hold a JSON array of entries"))?;
    items
        .iter()
        .enumerate()
        .map(|(idx, item)| {
            CatalogEntry::from_value(item).map_err(|e| Error::invalid_entry(format!("entry {idx}: {e}")))
        })
        .collect()
}

/// Compile a structural schema. A missing or broken schema disables the check.
fn compile_schema(path: &Path) -> Option<Validator> {
    if !path.is_file() {
        debug!(schema = %path.display(), "no structural schema");
        return None;
    }
    let compiled = read_json(path).map_err(|e| e.to_string()).and_then(|schema| {
        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        opts.build(&schema).map_err(|e| e.to_string())
    });
    match compiled {
        Ok(validator) => Some(validator),
        Err(message) => {
            let error = Error::SchemaLoad {
                path: path.display().to_string(),
                message,
            };
            warn!(%error, "structural check disabled");
            None
        }
    }
}

fn file_location(path: &Path) -> Location {
    Location::path(path.display().to_string())
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
