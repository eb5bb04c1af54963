//! Embedding adapters.
//!
//! Real embedding models live outside this workspace; callers plug them in
//! through [`passagedb_core::traits::Embedder`]. This crate provides the
//! deterministic [`HashingEmbedder`] used in tests and offline runs, and
//! [`CheckedEmbedder`], which enforces the count and dimension contract on
//! any other embedder.

mod error;
mod hashing;

pub use error::EmbedError;
pub use hashing::HashingEmbedder;

use passagedb_core::traits::Embedder;

/// Wraps an embedder and rejects output that does not have exactly one
/// vector of length `dim()` per input.
pub struct CheckedEmbedder<E> {
    inner: E,
}

impl<E: Embedder> CheckedEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: Embedder> Embedder for CheckedEmbedder<E> {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let vectors = self.inner.embed_batch(texts)?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch { expected: texts.len(), actual: vectors.len() }.into());
        }
        let dim = self.inner.dim();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(EmbedError::DimensionMismatch { expected: dim, actual: bad.len() }.into());
        }
        Ok(vectors)
    }
}
