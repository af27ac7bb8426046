//! palace-providers: generative backend integrations.
//!
//! Implements the `GenerativeBackend` trait for Gemini, OpenAI-compatible
//! servers, Anthropic, and Ollama, and builds the backend roster from
//! `palace.toml`.

pub mod anthropic;
pub mod config;
pub mod gemini;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{
    build_pipeline, build_roster, create_backend, load_config, load_config_from, BackendEntry,
    PalaceConfig, ProviderConfig,
};
pub use palace_core::ProviderError;
