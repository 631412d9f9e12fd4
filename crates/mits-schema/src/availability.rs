//! Outcome of loading an optional rule artifact

use std::sync::Arc;

/// A rule artifact that may be absent or broken
///
/// Absence is expected (rule files are optional per version), so it is a
/// variant rather than an error.
#[derive(Debug)]
pub enum Availability<T> {
    /// Compiled and ready to use
    Available(Arc<T>),

    /// No file at the expected location
    Missing,

    /// The file exists but could not be compiled
    ParseFailed(String),
}

impl<T> Availability<T> {
    /// Wrap a freshly compiled artifact.
    pub fn available(value: T) -> Self {
        Self::Available(Arc::new(value))
    }

    /// Whether the artifact can be used.
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    /// Borrow the artifact, if available.
    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(&**value),
            _ => None,
        }
    }

    /// Failure reason, if compilation failed.
    pub fn failure(&self) -> Option<&str> {
        match self {
            Self::ParseFailed(reason) => Some(reason.as_str()),
            _ => None,
        }
    }
}

impl<T> Clone for Availability<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Available(value) => Self::Available(Arc::clone(value)),
            Self::Missing => Self::Missing,
            Self::ParseFailed(reason) => Self::ParseFailed(reason.clone()),
        }
    }
}

impl<T, E: std::fmt::Display> From<std::result::Result<T, E>> for Availability<T> {
    fn from(result: std::result::Result<T, E>) -> Self {
        match result {
            Ok(value) => Self::available(value),
            Err(e) => Self::ParseFailed(e.to_string()),
        }
    }
}
