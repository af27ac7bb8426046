//! Error types.
//!
//! `ProviderError` is what backend clients return; it lives here so the
//! cascade can downcast and classify failures without string matching.
//! `RecoveryError` and `CascadeError` are the component failures, and
//! `PipelineError` is the caller-facing taxonomy they convert into.

use thiserror::Error;

use crate::cascade::GenerationAttempt;
use crate::recovery::ContainerKind;

/// Errors that can occur when interacting with a generative backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Failure to recover a structured payload from backend text.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// No opening/closing bracket pair of the expected kind was found.
    #[error("no structured {expected} payload found in response")]
    NoStructuredPayload { expected: ContainerKind },

    /// A bracketed region was found but did not parse, even after sanitization.
    #[error("structured payload is unparseable after sanitization: {reason}")]
    UnrecoverablePayload { reason: String, original: String },
}

/// Failure of a cascade run.
#[derive(Debug, Error)]
pub enum CascadeError {
    /// Every backend failed or timed out. One entry per backend, in order.
    #[error("all {} backends exhausted: {}", .attempts.len(), summarize(.attempts))]
    AllBackendsExhausted { attempts: Vec<GenerationAttempt> },

    /// The caller cancelled the run.
    #[error("cascade cancelled after {} attempts", .attempts.len())]
    Cancelled { attempts: Vec<GenerationAttempt> },
}

/// Caller-facing pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source text absent or too short; no backend was invoked.
    #[error("source text is empty or too short ({chars} chars, need at least {min})")]
    EmptySourceText { chars: usize, min: usize },

    #[error("all {} backends exhausted: {}", .attempts.len(), summarize(.attempts))]
    AllBackendsExhausted { attempts: Vec<GenerationAttempt> },

    #[error("no structured {expected} payload found in response")]
    NoStructuredPayload { expected: ContainerKind },

    #[error("structured payload is unparseable after sanitization: {reason}")]
    UnrecoverablePayload { reason: String, original: String },

    /// The caller cancelled the run.
    #[error("pipeline run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether re-running the whole pipeline could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::AllBackendsExhausted { attempts } => {
                !attempts.iter().all(|a| a.is_permanent_failure())
            }
            PipelineError::NoStructuredPayload { .. }
            | PipelineError::UnrecoverablePayload { .. } => true,
            PipelineError::EmptySourceText { .. } | PipelineError::Cancelled => false,
        }
    }

    /// Largest rate-limit hint reported by any backend, in milliseconds.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            PipelineError::AllBackendsExhausted { attempts } => {
                attempts.iter().filter_map(|a| a.retry_after_ms()).max()
            }
            _ => None,
        }
    }
}

impl From<RecoveryError> for PipelineError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::NoStructuredPayload { expected } => {
                PipelineError::NoStructuredPayload { expected }
            }
            RecoveryError::UnrecoverablePayload { reason, original } => {
                PipelineError::UnrecoverablePayload { reason, original }
            }
        }
    }
}

impl From<CascadeError> for PipelineError {
    fn from(err: CascadeError) -> Self {
        match err {
            CascadeError::AllBackendsExhausted { attempts } => {
                PipelineError::AllBackendsExhausted { attempts }
            }
            CascadeError::Cancelled { .. } => PipelineError::Cancelled,
        }
    }
}

fn summarize(attempts: &[GenerationAttempt]) -> String {
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
