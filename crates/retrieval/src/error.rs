use crate::service::Phase;
use ashguard_knowledge::KnowledgeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("Knowledge base is not ready (phase: {phase})")]
    NotReady { phase: Phase },

    #[error("Knowledge base unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Index query failed: {0}")]
    Index(String),

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Initialization is already in progress")]
    AlreadyInitializing,
}

impl RetrievalError {
    /// The caller may retry the same request later
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::NotReady { .. } | Self::Unavailable { .. } | Self::AlreadyInitializing
        )
    }
}

/// Why initialization ended in `Failed`
#[derive(Error, Debug)]
pub enum InitError {
    #[error("knowledge base is empty: no manifest on disk and none of {attempted} source(s) could be fetched")]
    EmptyKnowledgeBase { attempted: usize },

    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),
}
