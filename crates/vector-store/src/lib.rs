//! # Ashguard Vector Store
//!
//! Embedding adapter and persistent exact-similarity index for document chunks.
//!
//! ## Features
//!
//! - **Exact k-NN search** via cosine similarity over all stored vectors
//! - **Idempotent upserts** keyed by chunk id
//! - **Deterministic ranking** (ties resolve by first-insertion order)
//! - **Atomic persistence** with write-then-rename JSON artifacts
//! - **Pluggable embedders** (ONNX MiniLM or a deterministic stub)
//!
//! ## Architecture
//!
//! ```text
//! chunk text
//!     │
//!     ├──> Embedder (ONNX / stub)
//!     │      └─> Vector[384]
//!     │
//!     ├──> VectorIndex::upsert
//!     │      └─> id → (vector, text, url)
//!     │
//!     └──> VectorIndex::save
//!            └─> index.json (tmp + rename)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use ashguard_vector_store::{Embedder, EmbeddingConfig, EmbeddingModel, EmbeddingRecord, VectorIndex};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let embedder = EmbeddingModel::from_config(&EmbeddingConfig::default())?;
//!     let mut index = VectorIndex::new(embedder.model_id(), embedder.dimension());
//!
//!     let text = "N95 respirators filter fine smoke particles";
//!     let vector = embedder.embed(text).await?;
//!     index.upsert(vec![EmbeddingRecord::new("a#0", vector, text, "https://example.org")])?;
//!
//!     let query = embedder.embed("which mask protects against smoke?").await?;
//!     for hit in index.query(&query, 3)? {
//!         println!("{}: {:.3}", hit.url, hit.score);
//!     }
//!     index.save("index.json").await?;
//!     Ok(())
//! }
//! ```

mod embeddings;
mod error;
mod index;
mod types;

pub use embeddings::{
    cosine_similarity, Embedder, EmbeddingConfig, EmbeddingMode, EmbeddingModel,
    DEFAULT_MODEL_ID,
};
pub use error::{Result, VectorStoreError};
pub use index::{VectorIndex, INDEX_SCHEMA_VERSION};
pub use types::{EmbeddingRecord, ScoredRecord, UpsertStats};
