//! # Ashguard Text Chunker
//!
//! Bounded, overlapping text chunking for retrieval over scraped documents.
//!
//! ## Philosophy
//!
//! The chunker creates fragments that:
//! - Never exceed `chunk_size` characters
//! - Share exactly `chunk_overlap` characters with their predecessor
//! - Prefer natural boundaries (paragraph, line, sentence, word) over hard cuts
//! - Lose nothing: the non-overlapping cores concatenate back to the input
//!
//! ## Architecture
//!
//! ```text
//! Raw text
//!     │
//!     ├──> Window [start, start + chunk_size)
//!     │
//!     ├──> Boundary search, coarsest level first
//!     │    ├─> paragraph  "\n\n"
//!     │    ├─> line       "\n"
//!     │    ├─> sentence   ". " "? " "! "
//!     │    ├─> word       " "
//!     │    └─> character  (hard cut)
//!     │
//!     └──> Next window starts `chunk_overlap` characters before the cut
//! ```
//!
//! ## Example
//!
//! ```rust
//! use ashguard_text_chunker::{ChunkerConfig, TextChunker};
//!
//! let chunker = TextChunker::new(ChunkerConfig::default()).unwrap();
//! let chunks = chunker.split("Wildfire smoke carries fine particulate matter.");
//! assert_eq!(chunks.len(), 1);
//! ```

mod chunker;
mod config;
mod error;

pub use chunker::{reassemble, split, TextChunker};
pub use config::{ChunkerConfig, SeparatorLevel};
pub use error::{ChunkerError, Result};
