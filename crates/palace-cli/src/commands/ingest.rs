//! The `palace ingest` command.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use palace_core::pipeline::Ingested;
use palace_providers::build_pipeline;

use super::analyze::title_from_path;

pub async fn execute(
    dir: PathBuf,
    config_path: Option<PathBuf>,
    cancel: CancellationToken,
) -> Result<()> {
    let files = text_files(&dir)?;
    anyhow::ensure!(!files.is_empty(), "no .txt files found in {}", dir.display());

    let (config, store) = super::open(config_path.as_deref())?;
    let pipeline = build_pipeline(&config)?;
    let semaphore = Semaphore::new(config.parallelism);

    eprintln!(
        "Ingesting {} files ({} at a time)",
        files.len(),
        config.parallelism
    );
    let start = Instant::now();

    let mut futures = FuturesUnordered::new();
    for path in &files {
        let pipeline = &pipeline;
        let store = &store;
        let semaphore = &semaphore;
        let cancel = &cancel;

        futures.push(async move {
            let outcome: Result<Ingested> = async {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| anyhow::anyhow!("semaphore closed"))?;
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                pipeline
                    .ingest(&title_from_path(path), &text, store, cancel)
                    .await
            }
            .await;
            (path, outcome)
        });
    }

    let mut table = Table::new();
    table.set_header(vec!["File", "Outcome", "Record", "Questions"]);
    let mut failed = 0usize;

    while let Some((path, outcome)) = futures.next().await {
        let name = path.display().to_string();
        match outcome {
            Ok(ingested) => {
                eprintln!("  Done: {name}");
                table.add_row(vec![
                    Cell::new(name),
                    Cell::new("ok"),
                    Cell::new(ingested.record.id),
                    Cell::new(ingested.record.analysis.question_count()),
                ]);
            }
            Err(e) => {
                tracing::error!("ingest failed for {name}: {e:#}");
                table.add_row(vec![
                    Cell::new(name),
                    Cell::new(format!("error: {e}")),
                    Cell::new("-"),
                    Cell::new("-"),
                ]);
                failed += 1;
            }
        }
    }

    println!("{table}");
    eprintln!(
        "\nComplete: {}/{} succeeded, {failed} failed ({:.1}s)",
        files.len() - failed,
        files.len(),
        start.elapsed().as_secs_f64()
    );

    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed", files.len());
    }
    Ok(())
}

/// `.txt` files directly inside `dir`, sorted by name.
fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
