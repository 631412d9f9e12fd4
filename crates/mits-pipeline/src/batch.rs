//! Concurrent validation of many inputs
//!
//! Each input runs on the blocking pool behind a semaphore bounding how many
//! validations are in flight. A task that cannot be joined, or that outlives
//! its timeout, still yields an envelope: one carrying a single
//! `ENGINE:ASYNC_VALIDATION_FAILED` finding.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use mits_findings::{Finding, codes};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::envelope::{InputDescriptor, ResultEnvelope};
use crate::orchestrator::{Orchestrator, ValidationInput};
use crate::profiles::Profile;

type Outcome = std::result::Result<ResultEnvelope, String>;

/// Configuration for batch validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchConfig {
    /// Maximum validations running at once
    pub max_concurrency: usize,
    /// Per-input time limit; falls back to the profile's intake timeout
    pub timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism().map_or(4, NonZeroUsize::get),
            timeout: None,
        }
    }
}

/// Validates inputs concurrently against one shared [`Orchestrator`]
#[derive(Debug)]
pub struct BatchValidator {
    orchestrator: Arc<Orchestrator>,
    config: BatchConfig,
    semaphore: Arc<Semaphore>,
}

impl BatchValidator {
    pub fn new(orchestrator: Arc<Orchestrator>, config: BatchConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            orchestrator,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Validate one input on the blocking pool.
    pub async fn validate_one(&self, input: ValidationInput, profile: &str) -> ResultEnvelope {
        let profile = Arc::new(self.orchestrator.profiles().resolve(profile));
        let (descriptor, handle) = self.spawn(input, &profile);
        self.finish(&profile, descriptor, handle).await
    }

    /// Validate every input under one profile. Envelopes come back in input
    /// order.
    pub async fn validate_all(&self, inputs: Vec<ValidationInput>, profile: &str) -> Vec<ResultEnvelope> {
        let profile = Arc::new(self.orchestrator.profiles().resolve(profile));
        debug!(inputs = inputs.len(), profile = profile.name.as_str(), "batch started");

        let tasks: Vec<_> = inputs
            .into_iter()
            .map(|input| self.spawn(input, &profile))
            .collect();

        let mut envelopes = Vec::with_capacity(tasks.len());
        for (descriptor, handle) in tasks {
            envelopes.push(self.finish(&profile, descriptor, handle).await);
        }
        envelopes
    }

    fn timeout_for(&self, profile: &Profile) -> Option<Duration> {
        self.config.timeout.or_else(|| {
            profile
                .intake_limits
                .as_ref()
                .and_then(|l| l.timeout_seconds)
                .map(Duration::from_secs)
        })
    }

    fn spawn(&self, input: ValidationInput, profile: &Arc<Profile>) -> (InputDescriptor, JoinHandle<Outcome>) {
        let descriptor = input.descriptor();
        let orchestrator = Arc::clone(&self.orchestrator);
        let profile = Arc::clone(profile);
        let semaphore = Arc::clone(&self.semaphore);
        let timeout = self.timeout_for(&profile);

        let handle = tokio::spawn(async move {
            let permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return Err(e.to_string()),
            };
            // Held until the blocking work ends, even past a timeout
            let work = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                orchestrator.validate_with(&input, &profile)
            });
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, work).await {
                    Ok(joined) => joined.map_err(|e| e.to_string()),
                    Err(_) => Err(format!("validation timed out after {} ms", limit.as_millis())),
                },
                None => work.await.map_err(|e| e.to_string()),
            }
        });
        (descriptor, handle)
    }

    async fn finish(
        &self,
        profile: &Profile,
        descriptor: InputDescriptor,
        handle: JoinHandle<Outcome>,
    ) -> ResultEnvelope {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(e.to_string()),
        };
        match outcome {
            Ok(envelope) => envelope,
            Err(reason) => {
                warn!(reason = reason.as_str(), "asynchronous validation failed");
                ResultEnvelope::intake_failure(
                    self.orchestrator.validator_info(&profile.name),
                    descriptor,
                    vec![Finding::new(
                        codes::ENGINE_ASYNC_VALIDATION_FAILED,
                        format!("Asynchronous validation failed: {reason}"),
                    )],
                )
            }
        }
    }
}
