#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # mits-pipeline
//!
//! Runs the validation stages against one document under one profile and
//! packages the outcome as a [`ResultEnvelope`].
//!
//! The [`Orchestrator`] owns the stage registry and the catalog registry for
//! one rules version and is shared by every run. Its entry point never
//! fails: intake problems, missing rule files, and crashed stages all end up
//! as findings in the envelope.
//!
//! ```no_run
//! use mits_pipeline::{Orchestrator, OrchestratorConfig, ValidationInput};
//!
//! let orchestrator = Orchestrator::new(OrchestratorConfig::new("rules"));
//! let envelope = orchestrator.validate(
//!     &ValidationInput::new(std::fs::read("feed.xml").unwrap()).with_content_type("application/xml"),
//!     "default",
//! );
//! println!("valid: {}", envelope.summary.valid);
//! ```

pub mod batch;
pub mod envelope;
pub mod intake;
pub mod orchestrator;
pub mod profiles;

pub use batch::{BatchConfig, BatchValidator};
pub use envelope::{
    API_VERSION, InputDescriptor, InputSource, ResultEnvelope, RunMetadata, StageSummary, Summary,
    ValidatorInfo,
};
pub use intake::check_intake;
pub use orchestrator::{ExecutionMode, Orchestrator, OrchestratorConfig, ValidationInput};
pub use profiles::{BUILTIN_PROFILES, IntakeLimits, Profile, ProfileResolver};

use thiserror::Error;

/// Errors raised while preparing a run
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid profile '{path}': {message}")]
    Profile { path: String, message: String },

    #[error("IO error during {operation} for '{path}': {message}")]
    Io {
        operation: String,
        path: String,
        message: String,
    },
}

impl Error {
    /// Create a profile error with the offending file for context.
    pub fn profile(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Profile {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a structured I/O error with operation/path context.
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_preserves_context() {
        let error = Error::io("read profile", "/rules/mits-5.0/profiles/pms.yaml", "permission denied");
        match error {
            Error::Io {
                operation,
                path,
                message,
            } => {
                assert_eq!(operation, "read profile");
                assert_eq!(path, "/rules/mits-5.0/profiles/pms.yaml");
                assert_eq!(message, "permission denied");
            }
            Error::Profile { .. } => panic!("expected io variant"),
        }
    }

    #[test]
    fn test_profile_error_display() {
        let error = Error::profile("pms.yaml", "missing field `name`");
        assert_eq!(error.to_string(), "Invalid profile 'pms.yaml': missing field `name`");
    }
}
