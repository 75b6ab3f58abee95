use thiserror::Error;

pub type Result<T> = std::result::Result<T, KnowledgeError>;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Chunker error: {0}")]
    Chunker(#[from] ashguard_text_chunker::ChunkerError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] ashguard_vector_store::VectorStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt artifact: {0}")]
    Corrupt(String),

    #[error("Build lock error: {0}")]
    Lock(String),

    #[error("{0}")]
    Other(String),
}
