use passagedb_core::SourceKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("vector search failed: {0}")]
    Dense(#[source] anyhow::Error),

    #[error("keyword search failed: {0}")]
    Keyword(#[source] anyhow::Error),

    #[error("{side} search timed out")]
    Timeout { side: SourceKind },

    #[error("search task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
