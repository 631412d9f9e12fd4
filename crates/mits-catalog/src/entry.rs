//! Catalog entry types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// One controlled-vocabulary item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Unique within its catalog file
    pub code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Alternate accepted codes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Entry of the charge-class catalog
pub type ChargeClass = CatalogEntry;

/// Entry of a named enumeration
pub type EnumEntry = CatalogEntry;

const COMMON_FIELDS: [&str; 5] = ["code", "name", "description", "aliases", "notes"];

impl CatalogEntry {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            description: None,
            aliases: Vec::new(),
            notes: None,
        }
    }

    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build an entry from a parsed JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntry`] when `code` or `name` is missing or a
    /// common field has the wrong type.
    pub fn from_value(value: &Value) -> Result<Self> {
        let entry: Self = serde_json::from_value(value.clone())
            .map_err(|e| Error::invalid_entry(e.to_string()))?;
        if entry.code.trim().is_empty() {
            return Err(Error::invalid_entry("entry has an empty code"));
        }
        Ok(entry)
    }

    /// Whether `value` is this entry's code or one of its aliases.
    #[must_use]
    pub fn accepts(&self, value: &str) -> bool {
        self.code == value || self.aliases.iter().any(|a| a == value)
    }
}

/// An item specialization: the common entry fields plus open,
/// specialization-specific attributes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSpecialization {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ItemSpecialization {
    /// Build a specialization from a parsed JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEntry`] when the value is not an object or the
    /// common fields are invalid.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::invalid_entry("specialization must be a JSON object"))?;
        let entry = CatalogEntry::from_value(value)?;
        let attributes = object
            .iter()
            .filter(|(k, _)| !COMMON_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self { entry, attributes })
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.entry.code
    }

    /// Specialization-specific attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}
