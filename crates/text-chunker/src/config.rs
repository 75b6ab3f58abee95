use crate::error::{ChunkerError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for text chunking behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters (hard limit)
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    pub chunk_overlap: usize,

    /// Boundary levels, coarsest first. A hard character cut is always the last resort.
    pub separators: Vec<SeparatorLevel>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            separators: SeparatorLevel::default_hierarchy(),
        }
    }
}

impl ChunkerConfig {
    #[must_use]
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkerError::invalid_config("chunk_size must be > 0"));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ChunkerError::OverlapTooLarge {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }

        for level in &self.separators {
            if level.patterns.is_empty() {
                return Err(ChunkerError::invalid_config(format!(
                    "separator level '{}' has no patterns",
                    level.name
                )));
            }
            if level.patterns.iter().any(String::is_empty) {
                return Err(ChunkerError::invalid_config(format!(
                    "separator level '{}' contains an empty pattern",
                    level.name
                )));
            }
        }

        Ok(())
    }
}

/// One rung of the separator hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatorLevel {
    pub name: String,
    pub patterns: Vec<String>,
}

impl SeparatorLevel {
    pub fn new(name: impl Into<String>, patterns: &[&str]) -> Self {
        Self {
            name: name.into(),
            patterns: patterns.iter().map(ToString::to_string).collect(),
        }
    }

    /// Paragraph, line, sentence, word.
    #[must_use]
    pub fn default_hierarchy() -> Vec<Self> {
        vec![
            Self::new("paragraph", &["\n\n"]),
            Self::new("line", &["\n"]),
            Self::new("sentence", &[". ", "? ", "! "]),
            Self::new("word", &[" "]),
        ]
    }
}
