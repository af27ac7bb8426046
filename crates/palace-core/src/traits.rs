//! Core trait definitions for generative backends and persistence.
//!
//! Backends are implemented by the `palace-providers` crate; the stores in
//! [`crate::store`] implement [`AnalysisStore`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{MemoryRecord, NewMemory};

// ---------------------------------------------------------------------------
// Generative backend trait
// ---------------------------------------------------------------------------

/// A text-generation service. All providers share this call shape.
///
/// Dropping the future returned by `generate` must abandon the underlying
/// request; the cascade relies on this for timeouts and cancellation.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Provider name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Generate text for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;
}

/// Request to generate text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "gemini-2.5-flash-lite").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Response from a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response text.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

// ---------------------------------------------------------------------------
// Persistence trait
// ---------------------------------------------------------------------------

/// Receives normalized analyses and owns their identity and durability.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist a new record, assigning its id and creation time.
    async fn save(&self, memory: NewMemory) -> anyhow::Result<MemoryRecord>;

    /// Load a record by id.
    async fn load(&self, id: Uuid) -> anyhow::Result<MemoryRecord>;

    /// All records, newest first.
    async fn list(&self) -> anyhow::Result<Vec<MemoryRecord>>;
}
