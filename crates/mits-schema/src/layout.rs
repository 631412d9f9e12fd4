//! Versioned rules directory layout
//!
//! ```text
//! <root>/<version>/
//!   catalogs/charge-classes.json
//!   catalogs/enums/*.json
//!   catalogs/item-specializations/*.json
//!   schemas/*.schema.json
//!   xsd/schema.xsd
//!   schematron/business-rules.sch
//!   profiles/*.yaml
//! ```

use std::path::{Path, PathBuf};

/// Catalog version used when none is configured
pub const DEFAULT_VERSION: &str = "mits-5.0";

/// Paths of every rule artifact for one catalog version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RulesLayout {
    root: PathBuf,
    version: String,
}

impl RulesLayout {
    pub fn new(root: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `<root>/<version>`
    #[must_use]
    pub fn version_dir(&self) -> PathBuf {
        self.root.join(&self.version)
    }

    /// Whether the version directory exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.version_dir().is_dir()
    }

    #[must_use]
    pub fn catalogs_dir(&self) -> PathBuf {
        self.version_dir().join("catalogs")
    }

    #[must_use]
    pub fn charge_classes_file(&self) -> PathBuf {
        self.catalogs_dir().join("charge-classes.json")
    }

    #[must_use]
    pub fn enums_dir(&self) -> PathBuf {
        self.catalogs_dir().join("enums")
    }

    #[must_use]
    pub fn specializations_dir(&self) -> PathBuf {
        self.catalogs_dir().join("item-specializations")
    }

    #[must_use]
    pub fn schemas_dir(&self) -> PathBuf {
        self.version_dir().join("schemas")
    }

    /// Structural schema for one catalog kind (`charge-classes`, `enum`, or a
    /// specialization name).
    #[must_use]
    pub fn catalog_schema(&self, name: &str) -> PathBuf {
        self.schemas_dir().join(format!("{name}.schema.json"))
    }

    #[must_use]
    pub fn xsd_file(&self) -> PathBuf {
        self.version_dir().join("xsd").join("schema.xsd")
    }

    #[must_use]
    pub fn schematron_file(&self) -> PathBuf {
        self.version_dir().join("schematron").join("business-rules.sch")
    }

    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.version_dir().join("profiles")
    }

    /// Profile file for a (lowercased) profile name.
    #[must_use]
    pub fn profile_file(&self, name: &str) -> PathBuf {
        self.profiles_dir()
            .join(format!("{}.yaml", name.to_ascii_lowercase()))
    }

    /// Versions present under the root, sorted.
    #[must_use]
    pub fn available_versions(root: &Path) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(root) else {
            return Vec::new();
        };
        let mut versions: Vec<String> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        versions.sort();
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let layout = RulesLayout::new("/rules", DEFAULT_VERSION);
        assert_eq!(layout.version_dir(), PathBuf::from("/rules/mits-5.0"));
        assert_eq!(
            layout.charge_classes_file(),
            PathBuf::from("/rules/mits-5.0/catalogs/charge-classes.json")
        );
        assert_eq!(
            layout.catalog_schema("enum"),
            PathBuf::from("/rules/mits-5.0/schemas/enum.schema.json")
        );
        assert_eq!(layout.xsd_file(), PathBuf::from("/rules/mits-5.0/xsd/schema.xsd"));
        assert_eq!(
            layout.schematron_file(),
            PathBuf::from("/rules/mits-5.0/schematron/business-rules.sch")
        );
        assert_eq!(
            layout.profile_file("PMS"),
            PathBuf::from("/rules/mits-5.0/profiles/pms.yaml")
        );
    }

    #[test]
    fn test_available_versions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("mits-5.0")).unwrap();
        std::fs::create_dir(dir.path().join("mits-4.1")).unwrap();
        std::fs::write(dir.path().join("README"), "x").unwrap();
        assert_eq!(
            RulesLayout::available_versions(dir.path()),
            vec!["mits-4.1".to_string(), "mits-5.0".to_string()]
        );
        assert!(RulesLayout::new(dir.path(), "mits-5.0").exists());
        assert!(!RulesLayout::new(dir.path(), "mits-9.9").exists());
    }
}
