//! # Ashguard Knowledge
//!
//! Builds the durable knowledge base that retrieval runs against.
//!
//! ## Pipeline
//!
//! ```text
//! Source URLs
//!     │
//!     ├──> Fetcher (bounded concurrency, per-request timeout)
//!     │      └─> Documents (failures logged and skipped)
//!     │
//!     ├──> TextChunker
//!     │      └─> Chunks with ids `<sha256(url)[..16]>#<index>`
//!     │
//!     ├──> manifest.json (tmp + rename)
//!     │
//!     └──> Embedder + VectorIndex (skipped when index.json is already populated)
//!            └─> index.json (tmp + rename)
//! ```
//!
//! All writes happen under an exclusive `build.lock` in the data directory.
//!
//! ## Example
//!
//! ```no_run
//! use ashguard_knowledge::{
//!     ArtifactPaths, BuildConfig, BuildOptions, HttpFetcher, KnowledgeBaseBuilder, SourceList,
//! };
//! use ashguard_vector_store::EmbeddingModel;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let builder = KnowledgeBaseBuilder::new(ArtifactPaths::new("data"), BuildConfig::default())?;
//!     let sources = SourceList::builtin()?;
//!     let outcome = builder
//!         .build(
//!             &sources.urls,
//!             Arc::new(HttpFetcher::new()?),
//!             &EmbeddingModel::stub(),
//!             BuildOptions::default(),
//!         )
//!         .await?;
//!
//!     println!("{:?}: {} chunks", outcome.report.status, outcome.report.chunks);
//!     Ok(())
//! }
//! ```

mod builder;
mod error;
mod fetch;
mod lock;
mod manifest;
mod paths;
mod sources;
mod types;

pub use builder::{
    BuildConfig, BuildOptions, BuildOutcome, BuildReport, BuildStatus, FetchFailure,
    KnowledgeBaseBuilder,
};
pub use error::{KnowledgeError, Result};
pub use fetch::{html_to_text, FetchError, Fetcher, HttpFetcher};
pub use lock::BuildLock;
pub use manifest::{ChunkManifest, MANIFEST_SCHEMA_VERSION};
pub use paths::{ArtifactPaths, INDEX_FILE, LOCK_FILE, MANIFEST_FILE};
pub use sources::SourceList;
pub use types::{Chunk, ChunkId, Document};
