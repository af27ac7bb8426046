//! The `palace regenerate-quiz` command.

use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use palace_core::traits::AnalysisStore;
use palace_providers::build_pipeline;

pub async fn execute(id: Uuid, config_path: Option<PathBuf>, cancel: CancellationToken) -> Result<()> {
    let (config, store) = super::open(config_path.as_deref())?;
    let record = store.load(id).await?;
    let pipeline = build_pipeline(&config)?;

    let regeneration = pipeline.regenerate_quiz(&record.source_text, &cancel).await?;
    if regeneration.quiz.is_empty() {
        eprintln!("Warning: every generated question was malformed and dropped");
    }
    eprintln!(
        "Generated {} questions for '{}' via {}",
        regeneration.quiz.len(),
        record.title,
        regeneration.report.backend
    );

    println!("{}", serde_json::to_string_pretty(&regeneration.quiz)?);
    Ok(())
}
