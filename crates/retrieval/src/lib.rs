//! # Ashguard Retrieval
//!
//! Readiness-gated top-k retrieval over the wildfire-health knowledge base.
//!
//! ## Lifecycle
//!
//! ```text
//!                 start / first query / reinitialize
//! Uninitialized ───────────────────────────────────> Initializing
//!                                                     │        │
//!                                              success│        │error
//!                                                     v        v
//!                                                   Ready    Failed
//!                                                     │        │
//!                                                     └──reinitialize──> Initializing
//! ```
//!
//! Initialization prefers the cheapest path: reuse `index.json`, else re-embed
//! `manifest.json`, else fetch every source. The index is published as an immutable
//! snapshot before `Ready` becomes visible, so queries never see a partial build.
//!
//! ## Example
//!
//! ```no_run
//! use ashguard_knowledge::HttpFetcher;
//! use ashguard_retrieval::{RetrievalService, ServiceConfig};
//! use ashguard_vector_store::EmbeddingModel;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::default();
//!     let embedder = Arc::new(EmbeddingModel::from_config(&config.embedding)?);
//!     let service = RetrievalService::new(config, embedder, Arc::new(HttpFetcher::new()?))?;
//!
//!     service.start().await?;
//!     service.wait_until_settled().await;
//!     for chunk in service.retrieve("Is wildfire ash safe to touch?", 3).await? {
//!         println!("{:.3} {}", chunk.score, chunk.url);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod service;

pub use config::{InitStrategy, ServiceConfig};
pub use error::{InitError, Result, RetrievalError};
pub use service::{Phase, ReinitMode, RetrievalService, RetrievedChunk, ServiceStatus};
