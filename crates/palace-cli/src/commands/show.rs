//! The `palace show` command.

use std::path::PathBuf;

use anyhow::Result;
use uuid::Uuid;

use palace_core::traits::AnalysisStore;

pub async fn execute(id: Uuid, config_path: Option<PathBuf>) -> Result<()> {
    let (_, store) = super::open(config_path.as_deref())?;
    let record = store.load(id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
