//! passagedb-core
//!
//! Domain types shared by the text, vector and hybrid engines, the
//! sentence-window chunker, configuration loading and the seam traits the
//! hybrid retriever is generic over.

pub mod chunker;
pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

pub use chunker::{Chunker, ChunkingConfig};
pub use error::{Error, Result};
pub use types::{BatchId, Chunk, ChunkId, Document, DocumentSection, Meta, SearchMode, SearchResult, SourceKind};
