//! passagedb-vector
//!
//! Dense similarity index over chunk embeddings: flat inner product, flat
//! L2 or an inverted file trained with k-means. Persisted as an index blob
//! plus a chunk sidecar.

mod config;
mod error;
mod index;
mod ivf;
mod persist;

pub use config::{IndexFamily, VectorIndexConfig};
pub use error::{Result, VectorIndexError};
pub use index::{VectorHit, VectorIndex, VectorStats};
pub use persist::{blob_path, sidecar_path};

use passagedb_core::traits::DenseIndex;
use passagedb_core::{BatchId, Chunk, SearchResult, SourceKind};

impl DenseIndex for VectorIndex {
    fn dim(&self) -> usize {
        self.config().dim
    }

    fn row_count(&self) -> usize {
        self.live_len()
    }

    fn last_batch(&self) -> Option<BatchId> {
        VectorIndex::last_batch(self)
    }

    fn batches(&self) -> Vec<BatchId> {
        VectorIndex::batches(self).iter().copied().collect()
    }

    fn batch_chunks(&self, batch: BatchId) -> Vec<Chunk> {
        VectorIndex::batch_chunks(self, batch)
    }

    fn add_batch(&mut self, vectors: &[Vec<f32>], chunks: &[Chunk], batch: BatchId) -> anyhow::Result<()> {
        Ok(self.add_with_batch(vectors, chunks, batch)?)
    }

    fn search_dense(&self, query: &[f32], k: usize) -> anyhow::Result<Vec<SearchResult>> {
        Ok(self
            .search(query, k)?
            .into_iter()
            .map(|hit| SearchResult::from_chunk(&hit.chunk, hit.score, SourceKind::Vector))
            .collect())
    }
}
