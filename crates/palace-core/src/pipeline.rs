//! Pipeline orchestrator.
//!
//! Source text in, [`AnalysisResult`] out: prompt, cascade, recovery,
//! normalization, assembly. Whole runs are retried with exponential backoff
//! when the failure is plausibly transient.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::cascade::{Cascade, GenerationAttempt};
use crate::error::PipelineError;
use crate::model::{AnalysisResult, QuizRecord};
use crate::normalize::{self, Normalized};
use crate::prompt;
use crate::recovery::{recover, ContainerKind};
use crate::store::{MemoryRecord, NewMemory};
use crate::traits::AnalysisStore;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source text beyond this many characters is not sent to backends.
    pub max_source_chars: usize,
    /// Trimmed source text shorter than this is rejected up front.
    pub min_source_chars: usize,
    /// Extra whole-pipeline attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry; doubles afterwards.
    pub retry_delay: Duration,
    /// Questions requested by quiz regeneration.
    pub quiz_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_source_chars: 20_000,
            min_source_chars: 20,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            quiz_count: prompt::DEFAULT_QUIZ_SIZE,
        }
    }
}

/// Diagnostics for one successful run. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Backend that produced the payload.
    pub backend: String,
    /// Cascade attempts of the successful pipeline attempt.
    pub attempts: Vec<GenerationAttempt>,
    /// Whether backslash sanitization was needed.
    pub sanitized: bool,
    pub dropped_quiz: usize,
    pub dropped_numerical_sets: usize,
    /// Whole-pipeline attempts, 1 when the first one succeeded.
    pub pipeline_attempts: u32,
}

/// A successful analysis and how it was obtained.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub result: AnalysisResult,
    pub report: RunReport,
}

/// An analysis handed to a store.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub record: MemoryRecord,
    pub report: RunReport,
}

/// Freshly generated quiz records.
#[derive(Debug, Clone)]
pub struct QuizRegeneration {
    pub quiz: Vec<QuizRecord>,
    pub report: RunReport,
}

/// Runs analyses against an immutable cascade. Cheap to share across tasks.
#[derive(Debug, Clone)]
pub struct Pipeline {
    cascade: Cascade,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(cascade: Cascade, config: PipelineConfig) -> Self {
        Self { cascade, config }
    }

    /// Analyze already-extracted source text.
    #[instrument(skip_all, fields(chars = source_text.chars().count()))]
    pub async fn analyze(
        &self,
        source_text: &str,
        cancel: &CancellationToken,
    ) -> Result<Analysis, PipelineError> {
        self.check_source(source_text)?;
        let prompt = prompt::analysis_prompt(source_text, self.config.max_source_chars);

        let (mut analysis, attempts) = self
            .with_retries(cancel, || self.analyze_once(&prompt, cancel))
            .await?;
        analysis.report.pipeline_attempts = attempts;

        info!(
            backend = %analysis.report.backend,
            questions = analysis.result.question_count(),
            pipeline_attempts = attempts,
            "analysis complete"
        );
        Ok(analysis)
    }

    /// Generate a fresh set of quiz questions for the source text.
    ///
    /// The result may be empty if every generated record was malformed.
    #[instrument(skip_all, fields(chars = source_text.chars().count()))]
    pub async fn regenerate_quiz(
        &self,
        source_text: &str,
        cancel: &CancellationToken,
    ) -> Result<QuizRegeneration, PipelineError> {
        self.check_source(source_text)?;
        let prompt = prompt::quiz_prompt(
            source_text,
            self.config.max_source_chars,
            self.config.quiz_count,
        );

        let (mut regeneration, attempts) = self
            .with_retries(cancel, || self.regenerate_once(&prompt, cancel))
            .await?;
        regeneration.report.pipeline_attempts = attempts;
        Ok(regeneration)
    }

    /// Analyze and hand exactly one result to `store`.
    ///
    /// Pipeline failures stay downcastable to [`PipelineError`].
    pub async fn ingest(
        &self,
        title: &str,
        source_text: &str,
        store: &dyn AnalysisStore,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Ingested> {
        let analysis = self.analyze(source_text, cancel).await?;
        let record = store
            .save(NewMemory {
                title: title.to_string(),
                source_text: source_text.to_string(),
                analysis: analysis.result,
            })
            .await?;
        info!(id = %record.id, title, "analysis stored");
        Ok(Ingested {
            record,
            report: analysis.report,
        })
    }

    fn check_source(&self, source_text: &str) -> Result<(), PipelineError> {
        let chars = source_text.trim().chars().count();
        if chars < self.config.min_source_chars.max(1) {
            return Err(PipelineError::EmptySourceText {
                chars,
                min: self.config.min_source_chars,
            });
        }
        Ok(())
    }

    async fn analyze_once(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Analysis, PipelineError> {
        let output = self.cascade.run(prompt, cancel).await?;
        let payload = recover(&output.text, ContainerKind::Object)?;
        let (result, dropped) = assemble(&payload.value);

        Ok(Analysis {
            result,
            report: RunReport {
                backend: output.backend,
                attempts: output.attempts,
                sanitized: payload.sanitized,
                dropped_quiz: dropped.quiz,
                dropped_numerical_sets: dropped.numerical_sets,
                pipeline_attempts: 1,
            },
        })
    }

    async fn regenerate_once(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<QuizRegeneration, PipelineError> {
        let output = self.cascade.run(prompt, cancel).await?;
        let payload = recover(&output.text, ContainerKind::Array)?;
        let Normalized { items, dropped } = normalize::normalize_quiz(Some(&payload.value));

        Ok(QuizRegeneration {
            quiz: items,
            report: RunReport {
                backend: output.backend,
                attempts: output.attempts,
                sanitized: payload.sanitized,
                dropped_quiz: dropped,
                dropped_numerical_sets: 0,
                pipeline_attempts: 1,
            },
        })
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    /// Returns the value and the number of attempts made.
    async fn with_retries<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<(T, u32), PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut delay = self.config.retry_delay.min(MAX_BACKOFF);
        let mut attempt = 1;

        loop {
            let err = match op().await {
                Ok(value) => return Ok((value, attempt)),
                Err(e) => e,
            };
            if !err.is_retryable() || attempt > self.config.max_retries {
                return Err(err);
            }

            let wait = err
                .retry_after_ms()
                .map_or(delay, |ms| delay.max(Duration::from_millis(ms)))
                .min(MAX_BACKOFF);
            warn!(
                attempt,
                wait_ms = wait.as_millis() as u64,
                "pipeline attempt failed, retrying: {err}"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }

            delay = (delay * 2).min(MAX_BACKOFF);
            attempt += 1;
        }
    }
}

/// Counts of records dropped while assembling a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dropped {
    pub quiz: usize,
    pub numerical_sets: usize,
}

/// Build an [`AnalysisResult`] from a recovered object payload. Missing or
/// mistyped fields become empty values; nothing here fails.
pub fn assemble(payload: &Value) -> (AnalysisResult, Dropped) {
    let quiz = normalize::normalize_quiz(payload.get("quiz"));
    let numericals = normalize::normalize_numericals(payload.get("numericals"));

    let result = AnalysisResult {
        summary: normalize::normalize_summary(payload.get("summary")),
        patterns: normalize::normalize_patterns(payload.get("patterns")).items,
        formulas: normalize::normalize_formulas(payload.get("formulas")).items,
        quiz: quiz.items,
        numericals: numericals.items,
        roadmap: normalize::normalize_roadmap(payload.get("roadmap")).items,
        diagram: normalize::normalize_diagram(payload.get("diagram")),
    };

    (
        result,
        Dropped {
            quiz: quiz.dropped,
            numerical_sets: numericals.dropped,
        },
    )
}
