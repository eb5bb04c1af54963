use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{vectors} vectors supplied for {chunks} chunks")]
    LengthMismatch { vectors: usize, chunks: usize },

    #[error("vector index is empty")]
    EmptyIndex,

    #[error("inverted-file training needs at least {needed} vectors, got {got}")]
    InsufficientTrainingData { needed: usize, got: usize },

    #[error("invalid vector index configuration: {0}")]
    InvalidConfig(String),

    #[error("chunk sidecar not found at {}", .0.display())]
    MissingSidecar(PathBuf),

    #[error("index blob holds {rows} rows but sidecar holds {chunks} chunks")]
    SidecarMismatch { rows: usize, chunks: usize },

    #[error("chunk sidecar checksum {actual:#x} does not match the index blob ({expected:#x})")]
    SidecarChecksum { expected: u64, actual: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("index blob: {0}")]
    Blob(#[from] bincode::Error),

    #[error("chunk sidecar: {0}")]
    Sidecar(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VectorIndexError>;
