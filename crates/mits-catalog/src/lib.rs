#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-catalog
//!
//! Controlled vocabularies (charge classes, enumerations, item
//! specializations) for one catalog version.
//!
//! [`CatalogLoader`] reads a version directory file by file. A file that is
//! missing, unparseable, structurally invalid or full of duplicates only
//! affects itself: it is reported as a `CATALOG:*` finding and the remaining
//! files still load. The resulting [`CatalogRegistry`] is read-only and can be
//! shared across concurrent validation runs.

/// Catalog entry types.
pub mod entry;
/// Versioned catalog loading.
pub mod loader;
/// Read-only registry of loaded catalogs.
pub mod registry;

pub use entry::{CatalogEntry, ChargeClass, EnumEntry, ItemSpecialization};
pub use loader::CatalogLoader;
pub use registry::{CatalogMetadata, CatalogRegistry, CatalogState, CatalogSummary};

use thiserror::Error;

/// Errors raised while reading a single catalog file
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid catalog entry: {message}")]
    InvalidEntry { message: String },

    #[error("Unusable structural schema '{path}': {message}")]
    SchemaLoad { path: String, message: String },
}

impl Error {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            message: message.into(),
        }
    }
}

/// Crate-local result type for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;
