use crate::types::Chunk;
use crate::{KnowledgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

/// Every chunk of the last successful build, in document then chunk order.
///
/// The index can be rebuilt from this artifact without re-fetching any source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkManifest {
    chunks: Vec<Chunk>,
}

#[derive(Serialize)]
struct PersistedManifestRef<'a> {
    schema_version: u32,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct PersistedManifest {
    schema_version: u32,
    chunks: Vec<Chunk>,
}

impl ChunkManifest {
    #[must_use]
    pub fn new(chunks: Vec<Chunk>) -> Self {
        Self { chunks }
    }

    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Distinct source URLs in first-seen order
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.chunks
            .iter()
            .map(|chunk| chunk.url.as_str())
            .filter(|url| seen.insert(*url))
            .collect()
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let persisted: PersistedManifest = serde_json::from_slice(&bytes)?;
        if persisted.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(KnowledgeError::Corrupt(format!(
                "Unsupported chunk manifest schema_version {} (expected {MANIFEST_SCHEMA_VERSION})",
                persisted.schema_version
            )));
        }
        Ok(Self {
            chunks: persisted.chunks,
        })
    }

    pub async fn load_if_present(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            return Ok(None);
        }
        Self::load(path).await.map(Some)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let persisted = PersistedManifestRef {
            schema_version: MANIFEST_SCHEMA_VERSION,
            chunks: &self.chunks,
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        log::info!("Saved chunk manifest ({} chunks) to {}", self.chunk_count(), path.display());
        Ok(())
    }
}
