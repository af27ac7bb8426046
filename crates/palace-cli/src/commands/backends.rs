//! The `palace backends` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use palace_providers::load_config_from;

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let ordered = config.ordered_backends();

    if ordered.is_empty() {
        println!("No backends configured. Run `palace init` and edit palace.toml.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Order", "Name", "Type", "Model", "Priority"]);
    for (i, (descriptor, entry)) in ordered.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&descriptor.name),
            Cell::new(entry.provider.kind()),
            Cell::new(&descriptor.model),
            Cell::new(descriptor.priority),
        ]);
    }
    println!("{table}");
    println!(
        "Attempt timeout: {}s, pipeline retries: {}",
        config.attempt_timeout_secs, config.max_retries
    );
    Ok(())
}
