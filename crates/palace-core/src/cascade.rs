//! Ordered backend fallback.
//!
//! A [`Cascade`] tries each backend of an immutable roster once, in priority
//! order, bounding every attempt by a fixed timeout. It never retries the
//! same backend; whole-pipeline retries live in [`crate::pipeline`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{CascadeError, ProviderError};
use crate::traits::{GenerateRequest, GenerativeBackend};

/// Identity and position of one backend in the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Configured name, unique within a roster.
    pub name: String,
    /// Model requested from this backend.
    pub model: String,
    /// Lower runs first.
    pub priority: u32,
}

/// The process-wide backend ordering. Built once, never mutated.
#[derive(Clone)]
pub struct BackendRoster {
    entries: Arc<[(BackendDescriptor, Arc<dyn GenerativeBackend>)]>,
}

impl BackendRoster {
    /// Build a roster, ordering entries by priority. Ties keep their
    /// declaration order.
    pub fn new(mut entries: Vec<(BackendDescriptor, Arc<dyn GenerativeBackend>)>) -> Self {
        entries.sort_by_key(|(d, _)| d.priority);
        Self {
            entries: entries.into(),
        }
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &BackendDescriptor> {
        self.entries.iter().map(|(d, _)| d)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for BackendRoster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptors()).finish()
    }
}

/// Generation parameters shared by every attempt.
#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub attempt_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_prompt: Option<String>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(60),
            max_tokens: 8192,
            temperature: 0.3,
            system_prompt: None,
        }
    }
}

/// Record of one backend attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub backend: String,
    pub model: String,
    pub elapsed_ms: u64,
    pub outcome: AttemptOutcome,
}

impl GenerationAttempt {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Failed(_))
    }

    pub(crate) fn is_permanent_failure(&self) -> bool {
        matches!(
            self.outcome,
            AttemptOutcome::Failed(AttemptFailure::Error {
                permanent: true,
                ..
            })
        )
    }

    pub(crate) fn retry_after_ms(&self) -> Option<u64> {
        match &self.outcome {
            AttemptOutcome::Failed(AttemptFailure::Error { retry_after_ms, .. }) => *retry_after_ms,
            _ => None,
        }
    }
}

impl fmt::Display for GenerationAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            AttemptOutcome::Succeeded => write!(f, "{} succeeded", self.backend),
            AttemptOutcome::Failed(failure) => write!(f, "{}: {}", self.backend, failure),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed(AttemptFailure),
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The backend returned an error.
    Error {
        message: String,
        /// Authentication or unknown-model errors.
        permanent: bool,
        retry_after_ms: Option<u64>,
    },
    /// The attempt exceeded the per-attempt timeout.
    TimedOut { after_ms: u64 },
    /// The backend succeeded with blank text.
    EmptyResponse,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Error { message, .. } => write!(f, "{message}"),
            AttemptFailure::TimedOut { after_ms } => write!(f, "timed out after {after_ms}ms"),
            AttemptFailure::EmptyResponse => write!(f, "empty response"),
        }
    }
}

/// First successful response of a cascade run.
#[derive(Debug, Clone)]
pub struct CascadeOutput {
    /// Raw response text, untrimmed.
    pub text: String,
    /// Name of the backend that produced it.
    pub backend: String,
    /// Every attempt in order, the last one being the success.
    pub attempts: Vec<GenerationAttempt>,
}

impl CascadeOutput {
    pub fn failures(&self) -> impl Iterator<Item = &GenerationAttempt> {
        self.attempts.iter().filter(|a| a.is_failure())
    }
}

/// Runs prompts against a roster.
#[derive(Debug, Clone)]
pub struct Cascade {
    roster: BackendRoster,
    config: CascadeConfig,
}

impl Cascade {
    pub fn new(roster: BackendRoster, config: CascadeConfig) -> Self {
        Self { roster, config }
    }

    /// Try each backend in order and return the first non-blank response.
    ///
    /// Cancelling `cancel` drops the in-flight call and returns immediately.
    pub async fn run(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<CascadeOutput, CascadeError> {
        let mut attempts = Vec::with_capacity(self.roster.len());

        for (descriptor, backend) in self.roster.entries.iter() {
            if cancel.is_cancelled() {
                return Err(CascadeError::Cancelled { attempts });
            }

            let request = GenerateRequest {
                model: descriptor.model.clone(),
                prompt: prompt.to_string(),
                system_prompt: self.config.system_prompt.clone(),
                max_tokens: self.config.max_tokens,
                temperature: self.config.temperature,
            };

            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(backend = %descriptor.name, "cancelled during generation");
                    return Err(CascadeError::Cancelled { attempts });
                }
                result = tokio::time::timeout(self.config.attempt_timeout, backend.generate(&request)) => result,
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;

            let failure = match result {
                Ok(Ok(response)) if !response.content.trim().is_empty() => {
                    info!(
                        backend = %descriptor.name,
                        model = %response.model,
                        elapsed_ms,
                        "generation succeeded"
                    );
                    attempts.push(GenerationAttempt {
                        backend: descriptor.name.clone(),
                        model: descriptor.model.clone(),
                        elapsed_ms,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    return Ok(CascadeOutput {
                        text: response.content,
                        backend: descriptor.name.clone(),
                        attempts,
                    });
                }
                Ok(Ok(_)) => AttemptFailure::EmptyResponse,
                Ok(Err(e)) => classify(&e),
                Err(_) => AttemptFailure::TimedOut {
                    after_ms: self.config.attempt_timeout.as_millis() as u64,
                },
            };

            warn!(backend = %descriptor.name, elapsed_ms, "attempt failed: {failure}");
            attempts.push(GenerationAttempt {
                backend: descriptor.name.clone(),
                model: descriptor.model.clone(),
                elapsed_ms,
                outcome: AttemptOutcome::Failed(failure),
            });
        }

        Err(CascadeError::AllBackendsExhausted { attempts })
    }
}

fn classify(err: &anyhow::Error) -> AttemptFailure {
    let provider = err.downcast_ref::<ProviderError>();
    AttemptFailure::Error {
        message: format!("{err:#}"),
        permanent: provider.is_some_and(ProviderError::is_permanent),
        retry_after_ms: provider.and_then(ProviderError::retry_after_ms),
    }
}
