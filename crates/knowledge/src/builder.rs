use crate::fetch::{FetchError, Fetcher};
use crate::lock::BuildLock;
use crate::manifest::ChunkManifest;
use crate::paths::ArtifactPaths;
use crate::types::{Chunk, Document};
use crate::{KnowledgeError, Result};
use ashguard_text_chunker::{ChunkerConfig, TextChunker};
use ashguard_vector_store::{Embedder, EmbeddingRecord, VectorIndex, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

const EMBED_BATCH: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub chunker: ChunkerConfig,

    /// Upper bound on one fetch, in seconds
    #[serde(rename = "fetch_timeout_secs", with = "duration_secs")]
    pub fetch_timeout: Duration,

    pub fetch_concurrency: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            fetch_timeout: Duration::from_secs(10),
            fetch_concurrency: 8,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Re-embed even when a non-empty index artifact already exists
    pub force_reindex: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Complete,
    Partial,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchFailure {
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    pub status: BuildStatus,
    /// Documents fetched successfully
    pub documents: usize,
    pub failures: Vec<FetchFailure>,
    /// Chunks written to the manifest
    pub chunks: usize,
    /// Texts sent to the embedder
    pub embedded: usize,
    /// Records in the resulting index
    pub indexed: usize,
    pub reused_index: bool,
    /// Time spent waiting for another builder to release the data directory
    pub lock_wait_ms: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub report: BuildReport,
    /// `None` only for an `Empty` build
    pub index: Option<VectorIndex>,
}

struct IndexedManifest {
    index: VectorIndex,
    embedded: usize,
    reused: bool,
}

/// Fetch -> chunk -> manifest -> embed -> index pipeline over one data directory
pub struct KnowledgeBaseBuilder {
    paths: ArtifactPaths,
    config: BuildConfig,
    chunker: TextChunker,
}

impl KnowledgeBaseBuilder {
    pub fn new(paths: ArtifactPaths, config: BuildConfig) -> Result<Self> {
        let chunker = TextChunker::new(config.chunker.clone())?;
        Ok(Self {
            paths,
            config,
            chunker,
        })
    }

    #[must_use]
    pub const fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    #[must_use]
    pub const fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Full build from source URLs.
    ///
    /// Failed fetches are logged and skipped. With zero fetched documents nothing is written
    /// and the report is `Empty`.
    pub async fn build(
        &self,
        urls: &[String],
        fetcher: Arc<dyn Fetcher>,
        embedder: &dyn Embedder,
        options: BuildOptions,
    ) -> Result<BuildOutcome> {
        let start = Instant::now();
        let lock = BuildLock::acquire(&self.paths.lock).await?;

        log::info!("Building knowledge base from {} source(s)", urls.len());
        let (documents, failures) = self.fetch_all(urls, fetcher).await;

        if documents.is_empty() {
            log::warn!(
                "No documents fetched ({} failure(s)); existing artifacts left untouched",
                failures.len()
            );
            return Ok(BuildOutcome {
                report: BuildReport {
                    status: BuildStatus::Empty,
                    documents: 0,
                    failures,
                    chunks: 0,
                    embedded: 0,
                    indexed: 0,
                    reused_index: false,
                    lock_wait_ms: lock.wait_ms(),
                    elapsed_ms: elapsed_ms(start),
                },
                index: None,
            });
        }

        let manifest = self.chunk_documents(&documents);
        manifest.save(&self.paths.manifest).await?;

        let indexed = self
            .index_locked(&manifest, embedder, options.force_reindex)
            .await?;

        let status = if failures.is_empty() {
            BuildStatus::Complete
        } else {
            BuildStatus::Partial
        };
        let report = BuildReport {
            status,
            documents: documents.len(),
            failures,
            chunks: manifest.chunk_count(),
            embedded: indexed.embedded,
            indexed: indexed.index.count(),
            reused_index: indexed.reused,
            lock_wait_ms: lock.wait_ms(),
            elapsed_ms: elapsed_ms(start),
        };
        log::info!(
            "Knowledge base ready: {} document(s), {} chunk(s), {} indexed in {} ms",
            report.documents,
            report.chunks,
            report.indexed,
            report.elapsed_ms
        );

        Ok(BuildOutcome {
            report,
            index: Some(indexed.index),
        })
    }

    /// Populate the index from an existing manifest without fetching
    pub async fn index_manifest(
        &self,
        manifest: &ChunkManifest,
        embedder: &dyn Embedder,
        force_reindex: bool,
    ) -> Result<BuildOutcome> {
        let start = Instant::now();
        let lock = BuildLock::acquire(&self.paths.lock).await?;

        log::info!(
            "Indexing {} chunk(s) from existing manifest",
            manifest.chunk_count()
        );
        let indexed = self.index_locked(manifest, embedder, force_reindex).await?;
        let report = BuildReport {
            status: BuildStatus::Complete,
            documents: manifest.urls().len(),
            failures: Vec::new(),
            chunks: manifest.chunk_count(),
            embedded: indexed.embedded,
            indexed: indexed.index.count(),
            reused_index: indexed.reused,
            lock_wait_ms: lock.wait_ms(),
            elapsed_ms: elapsed_ms(start),
        };

        Ok(BuildOutcome {
            report,
            index: Some(indexed.index),
        })
    }

    /// Manifest from the last successful build.
    ///
    /// An undecodable or unsupported-schema manifest is reported as absent so callers re-fetch.
    pub async fn load_manifest(&self) -> Result<Option<ChunkManifest>> {
        match ChunkManifest::load_if_present(&self.paths.manifest).await {
            Err(err @ (KnowledgeError::Serialization(_) | KnowledgeError::Corrupt(_))) => {
                log::warn!(
                    "Failed to read manifest {}: {err}; will re-fetch sources",
                    self.paths.manifest.display()
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Present, non-empty index produced by `embedder`'s model.
    ///
    /// Unreadable or foreign-model artifacts are reported as absent so callers rebuild them.
    pub async fn load_index(&self, embedder: &dyn Embedder) -> Result<Option<VectorIndex>> {
        let index = match VectorIndex::load_if_present(&self.paths.index).await {
            Ok(Some(index)) => index,
            Ok(None) => return Ok(None),
            Err(err) => {
                log::warn!(
                    "Failed to load index {}: {err}; will rebuild",
                    self.paths.index.display()
                );
                return Ok(None);
            }
        };

        if index.is_empty() {
            return Ok(None);
        }
        if index.model_id() != embedder.model_id() {
            log::warn!(
                "Index was built with model '{}' but embedder is '{}'; treating as stale",
                index.model_id(),
                embedder.model_id()
            );
            return Ok(None);
        }
        if index.dimension() != embedder.dimension() {
            return Err(VectorStoreError::DimensionMismatch {
                expected: embedder.dimension(),
                actual: index.dimension(),
            }
            .into());
        }
        Ok(Some(index))
    }

    /// Chunk fetched documents with ids derived from `(url, position)`
    #[must_use]
    pub fn chunk_documents(&self, documents: &[Document]) -> ChunkManifest {
        let chunks = documents
            .iter()
            .flat_map(|doc| {
                self.chunker
                    .split(&doc.raw_text)
                    .into_iter()
                    .enumerate()
                    .map(|(index, text)| Chunk::new(doc.url.clone(), index, text))
            })
            .collect();
        ChunkManifest::new(chunks)
    }

    async fn index_locked(
        &self,
        manifest: &ChunkManifest,
        embedder: &dyn Embedder,
        force_reindex: bool,
    ) -> Result<IndexedManifest> {
        if !force_reindex {
            if let Some(index) = self.load_index(embedder).await? {
                log::info!(
                    "Reusing existing index with {} record(s); skipping embedding",
                    index.count()
                );
                return Ok(IndexedManifest {
                    index,
                    embedded: 0,
                    reused: true,
                });
            }
        }

        let chunks = manifest.chunks();
        let mut index = VectorIndex::new(embedder.model_id(), embedder.dimension());
        for (batch_no, batch) in chunks.chunks(EMBED_BATCH).enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(KnowledgeError::Other(format!(
                    "Embedder returned {} vector(s) for {} text(s)",
                    vectors.len(),
                    texts.len()
                )));
            }

            let records = batch
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| {
                    EmbeddingRecord::new(
                        chunk.id.to_string(),
                        vector,
                        chunk.text.clone(),
                        chunk.url.clone(),
                    )
                })
                .collect();
            index.upsert(records)?;
            log::debug!(
                "Embedded batch {} ({} / {} chunks)",
                batch_no + 1,
                index.count(),
                chunks.len()
            );
        }

        index.save(&self.paths.index).await?;
        Ok(IndexedManifest {
            index,
            embedded: chunks.len(),
            reused: false,
        })
    }

    async fn fetch_all(
        &self,
        urls: &[String],
        fetcher: Arc<dyn Fetcher>,
    ) -> (Vec<Document>, Vec<FetchFailure>) {
        let mut seen = HashSet::new();
        let unique: Vec<String> = urls
            .iter()
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect();
        if unique.len() < urls.len() {
            log::debug!("Ignoring {} duplicate source URL(s)", urls.len() - unique.len());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.fetch_concurrency.max(1)));
        let timeout = self.config.fetch_timeout;
        let mut tasks = JoinSet::new();
        for (pos, url) in unique.iter().cloned().enumerate() {
            let fetcher = fetcher.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (pos, Err(FetchError::Other("fetch limiter closed".to_string())));
                };
                let result = match tokio::time::timeout(timeout, fetcher.fetch(&url, timeout)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(timeout)),
                };
                (pos, result)
            });
        }

        let mut slots: Vec<Option<std::result::Result<String, FetchError>>> =
            vec![None; unique.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((pos, result)) => slots[pos] = Some(result),
                Err(err) => log::warn!("Fetch task failed: {err}"),
            }
        }

        let mut documents = Vec::new();
        let mut failures = Vec::new();
        for (url, slot) in unique.into_iter().zip(slots) {
            let result = slot
                .unwrap_or_else(|| Err(FetchError::Other("fetch task aborted".to_string())));
            match result {
                Ok(text) if text.trim().is_empty() => {
                    log::warn!("Skipping {url}: no text content");
                    failures.push(FetchFailure {
                        url,
                        error: "no text content".to_string(),
                    });
                }
                Ok(text) => {
                    log::debug!("Fetched {url} ({} chars)", text.chars().count());
                    documents.push(Document::new(url, text));
                }
                Err(err) => {
                    log::warn!("Skipping {url}: {err}");
                    failures.push(FetchFailure {
                        url,
                        error: err.to_string(),
                    });
                }
            }
        }
        log::info!(
            "Fetched {} document(s), skipped {}",
            documents.len(),
            failures.len()
        );
        (documents, failures)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
