use crate::embeddings::cosine_similarity;
use crate::error::{Result, VectorStoreError};
use crate::types::{EmbeddingRecord, ScoredRecord, UpsertStats};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const INDEX_SCHEMA_VERSION: u32 = 1;

/// Exact cosine-similarity index keyed by chunk id.
///
/// Records keep the slot of their first insertion, so replacing a record never changes its
/// position in tie-breaks.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    model_id: String,
    dimension: usize,
    records: Vec<EmbeddingRecord>,
    positions: HashMap<String, usize>,
}

#[derive(Serialize)]
struct PersistedIndexRef<'a> {
    schema_version: u32,
    model_id: &'a str,
    dimension: usize,
    records: &'a [EmbeddingRecord],
}

#[derive(Deserialize)]
struct PersistedIndex {
    schema_version: u32,
    model_id: String,
    dimension: usize,
    records: Vec<EmbeddingRecord>,
}

impl VectorIndex {
    pub fn new(model_id: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dimension,
            records: Vec::new(),
            positions: HashMap::new(),
        }
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of distinct ids currently stored
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&EmbeddingRecord> {
        self.positions.get(id).map(|&pos| &self.records[pos])
    }

    /// Ids in insertion order
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Insert or replace records by id.
    ///
    /// The whole batch is dimension-checked before anything is written.
    pub fn upsert(&mut self, records: Vec<EmbeddingRecord>) -> Result<UpsertStats> {
        for record in &records {
            self.ensure_dimension(&record.vector)?;
        }

        let mut stats = UpsertStats::default();
        for record in records {
            if let Some(&pos) = self.positions.get(&record.id) {
                self.records[pos] = record;
                stats.replaced += 1;
            } else {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                stats.inserted += 1;
            }
        }

        log::debug!(
            "Upserted {} new, {} replaced ({} total)",
            stats.inserted,
            stats.replaced,
            self.records.len()
        );
        Ok(stats)
    }

    /// Up to `k` nearest records, best first
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        self.ensure_dimension(vector)?;
        if k == 0 || self.records.is_empty() {
            return Ok(Vec::new());
        }

        let mut scores: Vec<(usize, f32)> = self
            .records
            .iter()
            .enumerate()
            .map(|(pos, record)| (pos, cosine_similarity(vector, &record.vector)))
            .collect();

        scores.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        scores.truncate(k);

        Ok(scores
            .into_iter()
            .map(|(pos, score)| {
                let record = &self.records[pos];
                ScoredRecord {
                    id: record.id.clone(),
                    text: record.text.clone(),
                    url: record.url.clone(),
                    score,
                }
            })
            .collect())
    }

    fn ensure_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// Save index to disk via a temporary file and rename
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        log::info!("Saving VectorIndex ({} records) to {:?}", self.count(), path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedIndexRef {
            schema_version: INDEX_SCHEMA_VERSION,
            model_id: &self.model_id,
            dimension: self.dimension,
            records: &self.records,
        };
        let bytes = serde_json::to_vec(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Load index from disk
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let persisted: PersistedIndex = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != INDEX_SCHEMA_VERSION {
            return Err(VectorStoreError::Corrupt(format!(
                "unsupported index schema_version {} (expected {INDEX_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }

        let mut index = Self::new(persisted.model_id, persisted.dimension);
        for record in persisted.records {
            index.ensure_dimension(&record.vector)?;
            if index.positions.contains_key(&record.id) {
                return Err(VectorStoreError::Corrupt(format!(
                    "duplicate record id '{}'",
                    record.id
                )));
            }
            index.positions.insert(record.id.clone(), index.records.len());
            index.records.push(record);
        }

        log::info!("Loaded {} records from {:?}", index.count(), path);
        Ok(index)
    }

    /// Load the index if the artifact exists
    pub async fn load_if_present(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        Self::load(path).await.map(Some)
    }
}
