//! The `palace analyze` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use tokio_util::sync::CancellationToken;

use palace_core::pipeline::Ingested;
use palace_providers::build_pipeline;

pub async fn execute(
    input: PathBuf,
    title: Option<String>,
    json: bool,
    config_path: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    let text = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let title = title.unwrap_or_else(|| title_from_path(&input));

    let (config, store) = super::open(config_path.as_deref())?;
    let pipeline = build_pipeline(&config)?;

    let ingested = pipeline.ingest(&title, &text, &store, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ingested.record)?);
    } else {
        print_summary(&ingested);
    }
    Ok(())
}

/// File stem, or the whole file name if it has none.
pub(crate) fn title_from_path(path: &Path) -> String {
    path.file_stem()
        .or_else(|| path.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string())
}

fn print_summary(ingested: &Ingested) {
    let record = &ingested.record;
    let report = &ingested.report;
    let result = &record.analysis;

    let mut table = Table::new();
    table.set_header(vec!["Field", "Value"]);
    table.add_row(vec![Cell::new("Record"), Cell::new(record.id)]);
    table.add_row(vec![Cell::new("Title"), Cell::new(&record.title)]);
    table.add_row(vec![Cell::new("Backend"), Cell::new(&report.backend)]);
    table.add_row(vec![
        Cell::new("Attempts"),
        Cell::new(format!(
            "{} cascade / {} pipeline",
            report.attempts.len(),
            report.pipeline_attempts
        )),
    ]);
    table.add_row(vec![Cell::new("Patterns"), Cell::new(result.patterns.len())]);
    table.add_row(vec![Cell::new("Formulas"), Cell::new(result.formulas.len())]);
    table.add_row(vec![
        Cell::new("Quiz questions"),
        Cell::new(format!("{} ({} dropped)", result.quiz.len(), report.dropped_quiz)),
    ]);
    table.add_row(vec![
        Cell::new("Numerical sets"),
        Cell::new(format!(
            "{} ({} dropped)",
            result.numericals.len(),
            report.dropped_numerical_sets
        )),
    ]);
    table.add_row(vec![Cell::new("Roadmap steps"), Cell::new(result.roadmap.len())]);
    table.add_row(vec![
        Cell::new("Sanitized"),
        Cell::new(if report.sanitized { "yes" } else { "no" }),
    ]);

    println!("{table}");
    if !result.summary.is_empty() {
        println!("\n{}", result.summary);
    }
}
