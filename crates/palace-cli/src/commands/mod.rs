//! Subcommand implementations.

pub mod analyze;
pub mod backends;
pub mod ingest;
pub mod init;
pub mod list;
pub mod regenerate_quiz;
pub mod show;

use std::path::Path;

use anyhow::Result;

use palace_core::store::JsonDirStore;
use palace_providers::{load_config_from, PalaceConfig};

/// Load config plus the record store it points at.
pub(crate) fn open(config_path: Option<&Path>) -> Result<(PalaceConfig, JsonDirStore)> {
    let config = load_config_from(config_path)?;
    let store = JsonDirStore::new(&config.store_dir);
    Ok((config, store))
}
