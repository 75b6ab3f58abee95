use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Fetched page, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub raw_text: String,
}

impl Document {
    pub fn new(url: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// Stable chunk identifier: `<first 8 bytes of sha256(url) as hex>#<index>`.
///
/// The URL never appears verbatim, so delimiters inside URLs cannot produce colliding ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChunkId {
    url_hash: String,
    index: usize,
}

const URL_HASH_LEN: usize = 16;

impl ChunkId {
    #[must_use]
    pub fn new(url: &str, index: usize) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let url_hash = digest[..URL_HASH_LEN / 2]
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect();
        Self { url_hash, index }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (hash, index) = raw.split_once('#')?;
        if hash.len() != URL_HASH_LEN
            || !hash
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        let index = index.parse::<usize>().ok()?;
        Some(Self {
            url_hash: hash.to_string(),
            index,
        })
    }

    #[must_use]
    pub fn url_hash(&self) -> &str {
        &self.url_hash
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.url_hash, self.index)
    }
}

impl TryFrom<String> for ChunkId {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("malformed chunk id '{raw}'"))
    }
}

impl From<ChunkId> for String {
    fn from(id: ChunkId) -> Self {
        id.to_string()
    }
}

/// Unit stored and retrieved; immutable once produced by the builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub url: String,
    pub text: String,
}

impl Chunk {
    pub fn new(url: impl Into<String>, index: usize, text: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: ChunkId::new(&url, index),
            url,
            text: text.into(),
        }
    }
}
