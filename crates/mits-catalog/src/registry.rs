//! Read-only registry of loaded catalogs

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entry::{ChargeClass, EnumEntry, ItemSpecialization};

/// Load metadata for one catalog version
#[derive(Debug, Clone, Serialize)]
pub struct CatalogMetadata {
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    pub rules_dir: PathBuf,
    #[serde(skip)]
    pub load_duration: Duration,
}

/// Every catalog loaded for one version.
///
/// Built once by [`crate::CatalogLoader`] and never mutated afterwards, so a
/// single instance behind an [`Arc`] serves any number of concurrent runs.
#[derive(Debug, Clone)]
pub struct CatalogRegistry {
    pub(crate) charge_classes: BTreeMap<String, ChargeClass>,
    pub(crate) enums: BTreeMap<String, BTreeMap<String, EnumEntry>>,
    pub(crate) specializations: BTreeMap<String, ItemSpecialization>,
    pub(crate) metadata: CatalogMetadata,
}

impl CatalogRegistry {
    pub(crate) fn empty(version: impl Into<String>, rules_dir: impl Into<PathBuf>) -> Self {
        Self {
            charge_classes: BTreeMap::new(),
            enums: BTreeMap::new(),
            specializations: BTreeMap::new(),
            metadata: CatalogMetadata {
                version: version.into(),
                loaded_at: Utc::now(),
                rules_dir: rules_dir.into(),
                load_duration: Duration::ZERO,
            },
        }
    }

    #[must_use]
    pub fn metadata(&self) -> &CatalogMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    #[must_use]
    pub fn charge_class(&self, code: &str) -> Option<&ChargeClass> {
        self.charge_classes.get(code)
    }

    pub fn charge_classes(&self) -> impl Iterator<Item = &ChargeClass> {
        self.charge_classes.values()
    }

    /// Whether a charge-class catalog was loaded at all.
    #[must_use]
    pub fn has_charge_classes(&self) -> bool {
        !self.charge_classes.is_empty()
    }

    /// Whether `value` is a charge-class code or an alias of one.
    #[must_use]
    pub fn is_valid_charge_class(&self, value: &str) -> bool {
        self.charge_classes.contains_key(value) || self.charge_class_by_alias(value).is_some()
    }

    /// Charge class that lists `alias` among its aliases.
    #[must_use]
    pub fn charge_class_by_alias(&self, alias: &str) -> Option<&ChargeClass> {
        self.charge_classes
            .values()
            .find(|c| c.aliases.iter().any(|a| a == alias))
    }

    #[must_use]
    pub fn has_enum(&self, name: &str) -> bool {
        self.enums.contains_key(name)
    }

    #[must_use]
    pub fn enum_entries(&self, name: &str) -> Option<&BTreeMap<String, EnumEntry>> {
        self.enums.get(name)
    }

    pub fn enum_names(&self) -> impl Iterator<Item = &str> {
        self.enums.keys().map(String::as_str)
    }

    /// Whether `value` is a code or alias of the named enumeration.
    ///
    /// An enumeration that was never loaded contains nothing.
    #[must_use]
    pub fn enum_contains(&self, name: &str, value: &str) -> bool {
        self.enums
            .get(name)
            .is_some_and(|entries| entries.values().any(|e| e.accepts(value)))
    }

    /// Accepted values (codes and aliases) of the named enumeration.
    #[must_use]
    pub fn code_set(&self, name: &str) -> Option<BTreeSet<&str>> {
        let entries = self.enums.get(name)?;
        Some(
            entries
                .values()
                .flat_map(|e| std::iter::once(e.code.as_str()).chain(e.aliases.iter().map(String::as_str)))
                .collect(),
        )
    }

    #[must_use]
    pub fn specialization(&self, name: &str) -> Option<&ItemSpecialization> {
        self.specializations.get(name)
    }

    pub fn specialization_names(&self) -> impl Iterator<Item = &str> {
        self.specializations.keys().map(String::as_str)
    }

    #[must_use]
    pub fn charge_class_count(&self) -> usize {
        self.charge_classes.len()
    }

    #[must_use]
    pub fn enum_count(&self) -> usize {
        self.enums.len()
    }

    #[must_use]
    pub fn specialization_count(&self) -> usize {
        self.specializations.len()
    }

    /// Serializable overview for diagnostics output.
    #[must_use]
    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            version: self.metadata.version.clone(),
            loaded_at: self.metadata.loaded_at,
            load_duration_ms: u64::try_from(self.metadata.load_duration.as_millis()).unwrap_or(u64::MAX),
            charge_classes: self.charge_classes.len(),
            enums: self
                .enums
                .iter()
                .map(|(name, entries)| (name.clone(), entries.len()))
                .collect(),
            specializations: self.specializations.keys().cloned().collect(),
        }
    }
}

/// Catalog counts for one version
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub version: String,
    pub loaded_at: DateTime<Utc>,
    pub load_duration_ms: u64,
    pub charge_classes: usize,
    /// Enumeration name to entry count
    pub enums: BTreeMap<String, usize>,
    pub specializations: Vec<String>,
}

/// Outcome of loading the catalogs a validator was configured with
#[derive(Debug, Clone)]
pub enum CatalogState {
    Loaded(Arc<CatalogRegistry>),
    /// The registry could not be built at all
    Failed(String),
}

impl CatalogState {
    #[must_use]
    pub fn registry(&self) -> Option<&CatalogRegistry> {
        match self {
            CatalogState::Loaded(registry) => Some(registry.as_ref()),
            CatalogState::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, CatalogState::Loaded(_))
    }
}

impl From<CatalogRegistry> for CatalogState {
    fn from(registry: CatalogRegistry) -> Self {
        CatalogState::Loaded(Arc::new(registry))
    }
}
