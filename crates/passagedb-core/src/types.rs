//! Domain types used by the chunker, the text and vector engines and fusion.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// A caller-provided section boundary: `offset` is a byte offset into
/// `Document::body` where the section titled `title` starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub title: String,
    pub offset: usize,
}

/// An immutable source document. The core only ever reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub body: String,
    pub sections: Vec<DocumentSection>,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { doc_id: doc_id.into(), title: title.into(), body: body.into(), ..Self::default() }
    }

    /// Metadata copied onto every chunk cut from this document.
    pub fn chunk_metadata(&self) -> Meta {
        let mut meta = Meta::new();
        meta.insert("doc_id".to_string(), self.doc_id.clone());
        meta.insert("title".to_string(), self.title.clone());
        if !self.authors.is_empty() {
            meta.insert("authors".to_string(), self.authors.join(", "));
        }
        meta
    }
}

/// A chunk of a source document that is independently indexed.
///
/// - `chunk_id`: deterministic given `(doc_id, sequence index)`
/// - `start_offset`/`end_offset`: character offsets into the source text
/// - `token_estimate`: `chars / 4`, used for sizing only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub token_estimate: usize,
    pub metadata: Meta,
}

impl Chunk {
    pub fn section(&self) -> &str {
        self.metadata.get("section").map(String::as_str).unwrap_or("")
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Rejects empty or undersized chunks and inverted offsets.
    pub fn validate(&self, min_len: usize) -> crate::Result<()> {
        let len = self.char_len();
        if len == 0 || len < min_len || self.end_offset <= self.start_offset {
            return Err(Error::MalformedChunk { chunk_id: self.chunk_id.clone(), len, min: min_len });
        }
        Ok(())
    }
}

/// Monotonic ingestion batch identifier recorded by both stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl BatchId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Keyword,
    Hybrid,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Vector => "vector",
            SourceKind::Keyword => "keyword",
            SourceKind::Hybrid => "hybrid",
        };
        f.pad(name)
    }
}

/// Retrieval mode requested by the caller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Keyword,
    #[default]
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" | "dense" => Ok(Self::Vector),
            "keyword" | "lexical" | "bm25" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(Error::InvalidConfig(format!("unknown search mode '{other}'"))),
        }
    }
}

/// The uniform record returned by every engine and by fusion.
///
/// `score` is always "higher is better"; its scale depends on `source`
/// (cosine/inner product, BM25, or a fused score).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub text: String,
    pub score: f32,
    pub metadata: Meta,
    pub source: SourceKind,
}

impl SearchResult {
    pub fn from_chunk(chunk: &Chunk, score: f32, source: SourceKind) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            doc_id: chunk.doc_id.clone(),
            text: chunk.text.clone(),
            score,
            metadata: chunk.metadata.clone(),
            source,
        }
    }
}
