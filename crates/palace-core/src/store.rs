//! Persistence collaborators.
//!
//! The pipeline is storage-agnostic: it hands each finished analysis to an
//! [`AnalysisStore`], which assigns identity and keeps it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::AnalysisResult;
use crate::traits::AnalysisStore;

/// An analysis ready to be stored.
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub title: String,
    /// The extracted text the analysis was built from.
    pub source_text: String,
    pub analysis: AnalysisResult,
}

/// A stored analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub source_text: String,
    pub analysis: AnalysisResult,
}

impl MemoryRecord {
    fn assign(memory: NewMemory) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            title: memory.title,
            source_text: memory.source_text,
            analysis: memory.analysis,
        }
    }
}

/// One pretty-printed JSON file per record, named `<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

#[async_trait]
impl AnalysisStore for JsonDirStore {
    async fn save(&self, memory: NewMemory) -> Result<MemoryRecord> {
        let record = MemoryRecord::assign(memory);
        let json = serde_json::to_string_pretty(&record).context("failed to serialize record")?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create store directory {}", self.dir.display()))?;

        // Write-then-rename so readers never see a partial file.
        let path = self.path_for(record.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("failed to write record to {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("failed to move record into {}", path.display()))?;

        tracing::debug!(id = %record.id, path = %path.display(), "record saved");
        Ok(record)
    }

    async fn load(&self, id: Uuid) -> Result<MemoryRecord> {
        let path = self.path_for(id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("record {id} not found in {}", self.dir.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse record {}", path.display()))
    }

    async fn list(&self) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", self.dir.display()))
            }
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("skipping unreadable {}: {}", path.display(), e);
                    continue;
                }
            };
            match serde_json::from_str::<MemoryRecord>(&content) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryStore {
    async fn save(&self, memory: NewMemory) -> Result<MemoryRecord> {
        let record = MemoryRecord::assign(memory);
        self.records.write().await.push(record.clone());
        Ok(record)
    }

    async fn load(&self, id: Uuid) -> Result<MemoryRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("record {id} not found"))
    }

    async fn list(&self) -> Result<Vec<MemoryRecord>> {
        let mut records = self.records.read().await.clone();
        records.reverse();
        Ok(records)
    }
}
