//! Validation profiles
//!
//! A profile picks the stages to run, remaps finding severities and bounds
//! what the intake accepts. Profiles come from YAML files in the rules tree
//! or from the built-in set; resolving an unknown name falls back to the
//! built-in `default` profile instead of failing the run.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;

use mits_adapter_xml::media_type;
use mits_findings::{Finding, Severity};
use mits_schema::RulesLayout;
use mits_validation::StageKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Names of the profiles compiled into the validator
pub const BUILTIN_PROFILES: [&str; 4] = ["default", "pms", "ils", "marketplace"];

const DEFAULT_PROFILE: &str = "default";
const MIB: u64 = 1024 * 1024;

/// Limits checked before any stage runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeLimits {
    #[serde(default)]
    pub max_bytes: Option<u64>,
    /// Accepted media types; parameters such as `charset` are ignored
    #[serde(default)]
    pub allowed_content_types: Option<Vec<String>>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl IntakeLimits {
    /// Whether a document of `size` bytes fits.
    #[must_use]
    pub fn allows_size(&self, size: u64) -> bool {
        self.max_bytes.is_none_or(|max| size <= max)
    }

    /// Whether a declared content type is accepted. An undeclared type is
    /// always accepted.
    #[must_use]
    pub fn allows_content_type(&self, content_type: Option<&str>) -> bool {
        let (Some(allowed), Some(declared)) = (&self.allowed_content_types, content_type) else {
            return true;
        };
        let declared = media_type(declared);
        allowed.iter().any(|a| media_type(a) == declared)
    }
}

/// A named validation configuration. Immutable once resolved and shared
/// read-only between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    /// Stage names in execution order; unknown names are kept as written
    pub enabled_levels: Vec<String>,
    pub severity_overrides: BTreeMap<String, Severity>,
    pub intake_limits: Option<IntakeLimits>,
}

impl Profile {
    /// A profile with the given stages, no overrides and no intake limits.
    pub fn new<I, S>(name: impl Into<String>, levels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            description: String::new(),
            enabled_levels: normalize_levels(levels),
            severity_overrides: BTreeMap::new(),
            intake_limits: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_override(mut self, code: impl Into<String>, severity: Severity) -> Self {
        self.severity_overrides.insert(code.into(), severity);
        self
    }

    #[must_use]
    pub fn with_intake_limits(mut self, limits: IntakeLimits) -> Self {
        self.intake_limits = Some(limits);
        self
    }

    /// Built-in profile by case-insensitive name.
    #[must_use]
    pub fn builtin(name: &str) -> Option<Profile> {
        let all = StageKind::ALL.map(StageKind::name);
        let xml_types = || vec!["application/xml".to_string(), "text/xml".to_string()];
        let with_octet = || {
            let mut types = xml_types();
            types.push("application/octet-stream".to_string());
            types
        };
        let limits = |mib: u64, types: Vec<String>, timeout: u64| IntakeLimits {
            max_bytes: Some(mib * MIB),
            allowed_content_types: Some(types),
            timeout_seconds: Some(timeout),
        };

        let profile = match name.trim().to_ascii_lowercase().as_str() {
            "default" => Profile::new("default", all)
                .with_description("Default validation profile with all levels")
                .with_intake_limits(limits(10, with_octet(), 30)),
            "pms" => Profile::new("pms", [StageKind::WellFormed.name(), StageKind::Schema.name()])
                .with_description("Property Management System validation profile")
                .with_intake_limits(limits(5, xml_types(), 15)),
            "ils" => Profile::new("ils", all)
                .with_description("Internet Listing Service validation profile")
                .with_intake_limits(limits(20, with_octet(), 45)),
            "marketplace" => Profile::new("marketplace", all)
                .with_description("Marketplace validation profile with strict rules")
                .with_intake_limits(limits(50, xml_types(), 60)),
            _ => return None,
        };
        Some(profile)
    }

    /// The built-in `default` profile.
    #[must_use]
    pub fn default_profile() -> Profile {
        Profile::builtin(DEFAULT_PROFILE)
            .unwrap_or_else(|| Profile::new(DEFAULT_PROFILE, StageKind::ALL.map(StageKind::name)))
    }

    /// Parse a profile document.
    ///
    /// Severity overrides naming an unknown severity are skipped with a
    /// warning. A missing `name` falls back to `fallback_name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not valid YAML or a field has the
    /// wrong shape.
    pub fn from_yaml(text: &str, fallback_name: &str) -> std::result::Result<Profile, serde_yaml::Error> {
        let file: ProfileFile = serde_yaml::from_str(text)?;

        let mut severity_overrides = BTreeMap::new();
        for (code, value) in file.severity_overrides {
            match value.as_str().map(str::parse::<Severity>) {
                Some(Ok(severity)) => {
                    severity_overrides.insert(code, severity);
                }
                _ => warn!(code = code.as_str(), value = ?value, "invalid severity override skipped"),
            }
        }

        Ok(Profile {
            name: file.name.unwrap_or_else(|| fallback_name.to_string()),
            description: file.description,
            enabled_levels: normalize_levels(file.enabled_levels),
            severity_overrides,
            intake_limits: file.intake_limits,
        })
    }

    /// Override for a finding code, if any.
    #[must_use]
    pub fn override_for(&self, code: &str) -> Option<Severity> {
        self.severity_overrides.get(code).copied()
    }

    /// Remap severities of findings whose code has an override. Only the
    /// severity changes; applying twice equals applying once.
    #[must_use]
    pub fn apply_overrides(&self, findings: Vec<Finding>) -> Vec<Finding> {
        if self.severity_overrides.is_empty() {
            return findings;
        }
        findings
            .into_iter()
            .map(|f| match self.override_for(f.code()) {
                Some(severity) => f.with_severity(severity),
                None => f,
            })
            .collect()
    }

    /// Whether a stage is enabled.
    #[must_use]
    pub fn enables(&self, kind: StageKind) -> bool {
        self.enabled_levels.iter().any(|l| l == kind.name())
    }
}

/// On-disk profile shape
#[derive(Debug, Deserialize)]
struct ProfileFile {
    name: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "levels")]
    enabled_levels: Vec<String>,
    #[serde(default)]
    severity_overrides: BTreeMap<String, serde_yaml::Value>,
    #[serde(default)]
    intake_limits: Option<IntakeLimits>,
}

/// Canonical stage names, first occurrence kept, WellFormed first.
fn normalize_levels<I, S>(levels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let well_formed = StageKind::WellFormed.name();
    let mut seen = BTreeSet::new();
    let mut normalized = vec![well_formed.to_string()];
    seen.insert(well_formed.to_string());

    for level in levels {
        let level = level.as_ref().trim();
        if level.is_empty() {
            continue;
        }
        let name = StageKind::from_name(level).map_or_else(|| level.to_string(), |k| k.name().to_string());
        if seen.insert(name.clone()) {
            normalized.push(name);
        }
    }
    normalized
}

/// Resolves profile names against one version of a rules tree
#[derive(Debug, Clone)]
pub struct ProfileResolver {
    layout: RulesLayout,
}

impl ProfileResolver {
    pub fn new(layout: RulesLayout) -> Self {
        Self { layout }
    }

    /// Resolve a profile: the version's YAML file, then the built-in of the
    /// same name, then the built-in `default`. Never fails.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Profile {
        let name = match name.trim() {
            "" => DEFAULT_PROFILE.to_string(),
            n => n.to_ascii_lowercase(),
        };

        match self.load_file(&name) {
            Ok(Some(profile)) => {
                debug!(profile = name.as_str(), "profile loaded from rules tree");
                return profile;
            }
            Ok(None) => {}
            Err(e) => warn!(profile = name.as_str(), error = %e, "profile file unusable"),
        }

        if let Some(profile) = Profile::builtin(&name) {
            debug!(profile = name.as_str(), "using built-in profile");
            return profile;
        }

        info!(profile = name.as_str(), "unknown profile; falling back to default");
        Profile::default_profile()
    }

    /// Load `<version>/profiles/<name>.yaml`. `Ok(None)` when the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_file(&self, name: &str) -> Result<Option<Profile>> {
        let path = self.layout.profile_file(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::io("read profile", path.display().to_string(), e.to_string()));
            }
        };
        Profile::from_yaml(&text, &name.to_ascii_lowercase())
            .map(Some)
            .map_err(|e| Error::profile(path.display().to_string(), e.to_string()))
    }

    /// Names of every resolvable profile: built-ins plus YAML files, sorted.
    #[must_use]
    pub fn available(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = BUILTIN_PROFILES.iter().map(ToString::to_string).collect();
        if let Ok(entries) = fs::read_dir(self.layout.profiles_dir()) {
            names.extend(
                entries
                    .filter_map(std::result::Result::ok)
                    .map(|e| e.path())
                    .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
                    .filter_map(|p| p.file_stem().and_then(|s| s.to_str()).map(str::to_ascii_lowercase)),
            );
        }
        names.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mits_findings::codes;

    #[test]
    fn test_builtins() {
        for name in BUILTIN_PROFILES {
            let profile = Profile::builtin(name).unwrap();
            assert_eq!(profile.name, name);
            assert_eq!(profile.enabled_levels[0], "WellFormed");
            assert!(profile.intake_limits.is_some());
        }
        let pms = Profile::builtin("PMS").unwrap();
        assert_eq!(pms.enabled_levels, vec!["WellFormed", "XSD"]);
        assert_eq!(pms.intake_limits.unwrap().max_bytes, Some(5 * MIB));
        assert!(Profile::builtin("enterprise").is_none());
    }

    #[test]
    fn test_level_normalization() {
        let profile = Profile::new("custom", ["Schema", "BusinessRules", "xsd", "Spelling", " "]);
        assert_eq!(
            profile.enabled_levels,
            vec!["WellFormed", "XSD", "Schematron", "Spelling"]
        );
        assert!(profile.enables(StageKind::BusinessRules));
        assert!(!profile.enables(StageKind::Semantic));
    }

    #[test]
    fn test_from_yaml_skips_invalid_severities() {
        let yaml = r"
name: strict
enabled_levels: [WellFormed, Semantic]
severity_overrides:
  SEMANTIC:INCONSISTENT_RENT_REQUIREMENT: ERROR
  XSD:SCHEMA_MISSING: loud
  SCHEMATRON:RULE_FAILURE: 3
intake_limits:
  max_bytes: 1024
";
        let profile = Profile::from_yaml(yaml, "fallback").unwrap();
        assert_eq!(profile.name, "strict");
        assert_eq!(profile.enabled_levels, vec!["WellFormed", "Semantic"]);
        assert_eq!(profile.severity_overrides.len(), 1);
        assert_eq!(
            profile.override_for(codes::SEMANTIC_INCONSISTENT_RENT_REQUIREMENT),
            Some(Severity::Error)
        );
        let limits = profile.intake_limits.unwrap();
        assert_eq!(limits.max_bytes, Some(1024));
        assert_eq!(limits.allowed_content_types, None);
    }

    #[test]
    fn test_from_yaml_name_fallback() {
        let profile = Profile::from_yaml("description: nameless\n", "partner").unwrap();
        assert_eq!(profile.name, "partner");
        assert_eq!(profile.enabled_levels, vec!["WellFormed"]);
        assert!(Profile::from_yaml("enabled_levels: 7\n", "x").is_err());
    }

    #[test]
    fn test_apply_overrides_is_idempotent() {
        let profile = Profile::new("p", ["WellFormed"])
            .with_override(codes::SEMANTIC_INCONSISTENT_RENT_REQUIREMENT, Severity::Error)
            .with_override(codes::XSD_VALIDATION_ERROR, Severity::Info);
        let findings = vec![
            Finding::new(codes::SEMANTIC_INCONSISTENT_RENT_REQUIREMENT, "rent optional"),
            Finding::new(codes::XSD_VALIDATION_ERROR, "bad child"),
            Finding::new(codes::SEMANTIC_INVALID_CHARGE_CLASS, "bad class"),
        ];

        let once = profile.apply_overrides(findings.clone());
        let twice = profile.apply_overrides(once.clone());
        assert_eq!(once, twice);

        let severities: Vec<_> = once.iter().map(Finding::severity).collect();
        assert_eq!(severities, vec![Severity::Error, Severity::Info, Severity::Error]);
        for (before, after) in findings.iter().zip(&once) {
            assert_eq!(before.code(), after.code());
            assert_eq!(before.message(), after.message());
        }
    }

    #[test]
    fn test_intake_content_types() {
        let limits = IntakeLimits {
            max_bytes: Some(10),
            allowed_content_types: Some(vec!["application/xml".into(), "Text/XML".into()]),
            timeout_seconds: None,
        };
        assert!(limits.allows_content_type(Some("application/xml; charset=utf-8")));
        assert!(limits.allows_content_type(Some("TEXT/xml")));
        assert!(limits.allows_content_type(None));
        assert!(!limits.allows_content_type(Some("application/json")));
        assert!(limits.allows_size(10));
        assert!(!limits.allows_size(11));
        assert!(IntakeLimits::default().allows_size(u64::MAX));
    }

    #[test]
    fn test_resolver_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let profiles = dir.path().join("mits-5.0/profiles");
        fs::create_dir_all(&profiles).unwrap();
        fs::write(
            profiles.join("partner.yaml"),
            "name: partner\nenabled_levels: [WellFormed, XSD]\n",
        )
        .unwrap();
        fs::write(profiles.join("broken.yaml"), "enabled_levels: {{{{").unwrap();

        let resolver = ProfileResolver::new(RulesLayout::new(dir.path(), "mits-5.0"));
        assert_eq!(resolver.resolve("Partner").enabled_levels, vec!["WellFormed", "XSD"]);
        assert_eq!(resolver.resolve("ILS").name, "ils");
        assert_eq!(resolver.resolve("broken").name, "default");
        assert_eq!(resolver.resolve("nonexistent").name, "default");
        assert_eq!(resolver.resolve("").name, "default");
        assert!(resolver.load_file("broken").is_err());
        assert_eq!(
            resolver.available(),
            vec!["broken", "default", "ils", "marketplace", "partner", "pms"]
        );
    }
}
