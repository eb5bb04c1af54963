use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Malformed chunk {chunk_id}: {len} chars is below the minimum of {min}")]
    MalformedChunk { chunk_id: String, len: usize, min: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
