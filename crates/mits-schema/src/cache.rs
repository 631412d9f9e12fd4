//! Compiled artifact cache
//!
//! Entries are keyed by path and invalidated when the file's length or
//! modification time changes. Compilation failures are not cached, so a fixed
//! file is picked up on the next load.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::availability::Availability;
use crate::{Error, Result};

/// Identity of a rule file at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl Fingerprint {
    /// Fingerprint a file on disk.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when the file cannot be inspected.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Concurrent cache of compiled artifacts
#[derive(Debug)]
pub struct ArtifactCache<T> {
    entries: DashMap<PathBuf, (Fingerprint, Arc<T>)>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<T> ArtifactCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Load the artifact at `path`, compiling it with `compile` unless an
    /// entry with the same fingerprint is cached.
    pub fn load<F>(&self, path: &Path, compile: F) -> Availability<T>
    where
        F: FnOnce(&[u8]) -> Result<T>,
    {
        let fingerprint = match Fingerprint::of(path) {
            Ok(fp) => fp,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.entries.remove(path);
                trace!(path = %path.display(), "rule artifact missing");
                return Availability::Missing;
            }
            Err(e) => return Availability::ParseFailed(Error::io(path.display().to_string(), e).to_string()),
        };

        if let Some(entry) = self.entries.get(path) {
            if entry.0 == fingerprint {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(path = %path.display(), "artifact cache hit");
                return Availability::Available(Arc::clone(&entry.1));
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(path = %path.display(), "artifact cache miss");

        let compiled = std::fs::read(path)
            .map_err(|e| Error::io(path.display().to_string(), e))
            .and_then(|bytes| compile(&bytes));

        match compiled {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                self.entries
                    .insert(path.to_path_buf(), (fingerprint, Arc::clone(&artifact)));
                Availability::Available(artifact)
            }
            Err(e) => {
                self.entries.remove(path);
                Availability::ParseFailed(e.to_string())
            }
        }
    }

    /// Drop every cached artifact.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl<T> Default for ArtifactCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
