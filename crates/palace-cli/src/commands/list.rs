//! The `palace list` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use palace_core::traits::AnalysisStore;

pub async fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let (_, store) = super::open(config_path.as_deref())?;
    let records = store.list().await?;

    if records.is_empty() {
        println!("No records in {}", store.dir().display());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Id", "Created", "Title", "Questions"]);
    for record in &records {
        table.add_row(vec![
            Cell::new(record.id),
            Cell::new(record.created_at.format("%Y-%m-%d %H:%M")),
            Cell::new(&record.title),
            Cell::new(record.analysis.question_count()),
        ]);
    }
    println!("{table}");
    Ok(())
}
