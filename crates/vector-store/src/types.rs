use serde::{Deserialize, Serialize};

/// One embedded chunk, owned by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub url: String,
}

impl EmbeddingRecord {
    pub fn new(
        id: impl Into<String>,
        vector: Vec<f32>,
        text: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            vector,
            text: text.into(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub url: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub replaced: usize,
}
