//! palace-core: study-material analysis pipeline.
//!
//! This crate defines the data model, the backend and persistence traits,
//! and the pipeline that turns extracted text into a normalized
//! [`AnalysisResult`](model::AnalysisResult): a cascade over generative
//! backends, JSON payload recovery, and record normalization.

pub mod cascade;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod recovery;
pub mod store;
pub mod traits;

pub use cascade::{BackendDescriptor, BackendRoster, Cascade, CascadeConfig};
pub use error::{PipelineError, ProviderError};
pub use pipeline::{Analysis, Pipeline, PipelineConfig, RunReport};
