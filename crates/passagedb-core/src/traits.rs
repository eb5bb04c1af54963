use crate::types::{BatchId, Chunk, SearchResult};

/// External embedding function. Implementations must return one vector per
/// input text, in input order, all of length `dim()`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for a single input"))
    }
}

/// Dense (embedding) side of the hybrid retriever.
pub trait DenseIndex: Send + Sync {
    fn dim(&self) -> usize;
    fn row_count(&self) -> usize;
    fn last_batch(&self) -> Option<BatchId>;
    /// Every batch id this store has committed, ascending.
    fn batches(&self) -> Vec<BatchId>;
    /// Current chunks last written by `batch`.
    fn batch_chunks(&self, batch: BatchId) -> Vec<Chunk>;
    fn add_batch(&mut self, vectors: &[Vec<f32>], chunks: &[Chunk], batch: BatchId) -> anyhow::Result<()>;
    fn search_dense(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<SearchResult>>;
}

/// Lexical (keyword) side of the hybrid retriever. Writes take `&self`; the
/// implementation serializes writers internally.
pub trait KeywordIndex: Send + Sync {
    fn row_count(&self) -> anyhow::Result<usize>;
    fn last_batch(&self) -> anyhow::Result<Option<BatchId>>;
    /// Every batch id this store has committed, ascending.
    fn batches(&self) -> anyhow::Result<Vec<BatchId>>;
    /// Current chunks last written by `batch`.
    fn batch_chunks(&self, batch: BatchId) -> anyhow::Result<Vec<Chunk>>;
    fn upsert_batch(&self, chunks: &[Chunk], batch: BatchId) -> anyhow::Result<()>;
    fn search_keyword(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchResult>>;

    /// Whether any derived search structure agrees with the stored rows.
    fn in_sync(&self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// Re-derives the search structure from the stored rows.
    fn rebuild(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
