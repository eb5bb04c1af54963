use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

use passagedb_core::{BatchId, Chunk, ChunkId};

use crate::config::{IndexFamily, VectorIndexConfig};
use crate::error::{Result, VectorIndexError};
use crate::ivf::{self, IvfState};

/// A chunk returned by [`VectorIndex::search`] with its similarity score
/// (higher is better).
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorStats {
    pub total_vectors: usize,
    pub dim: usize,
    pub num_chunks: usize,
    pub family: IndexFamily,
    pub trained: bool,
    pub last_batch: Option<BatchId>,
}

/// In-memory embedding index. Row `i` of `vectors` belongs to `chunks[i]`
/// and was written by `row_batches[i]`; rows are only ever appended. When a
/// chunk id is written again the newer row supersedes the older one, which
/// stays in place but is never returned.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub(crate) config: VectorIndexConfig,
    pub(crate) vectors: Vec<f32>,
    pub(crate) chunks: Vec<Chunk>,
    pub(crate) row_batches: Vec<BatchId>,
    pub(crate) by_id: HashMap<ChunkId, usize>,
    pub(crate) ivf: Option<IvfState>,
    pub(crate) batches: BTreeSet<BatchId>,
}

impl VectorIndex {
    pub fn new(config: VectorIndexConfig) -> Result<Self> {
        if config.dim == 0 {
            return Err(VectorIndexError::InvalidConfig("dim must be positive".into()));
        }
        if let IndexFamily::Ivf { nlist, nprobe } = config.family {
            if nlist == 0 || nprobe == 0 {
                return Err(VectorIndexError::InvalidConfig("ivf nlist and nprobe must be positive".into()));
            }
        }
        Ok(Self {
            config,
            vectors: Vec::new(),
            chunks: Vec::new(),
            row_batches: Vec::new(),
            by_id: HashMap::new(),
            ivf: None,
            batches: BTreeSet::new(),
        })
    }

    /// Normalizing index of the given dimension and family.
    pub fn create(dim: usize, family: IndexFamily) -> Result<Self> {
        Self::new(VectorIndexConfig::new(dim, family))
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Distinct chunk ids, i.e. rows not superseded by a later write.
    pub fn live_len(&self) -> usize {
        self.by_id.len()
    }

    pub fn last_batch(&self) -> Option<BatchId> {
        self.batches.last().copied()
    }

    /// Every batch id committed to this index, ascending.
    pub fn batches(&self) -> &BTreeSet<BatchId> {
        &self.batches
    }

    /// Current chunks whose latest write came from `batch`, in row order.
    pub fn batch_chunks(&self, batch: BatchId) -> Vec<Chunk> {
        (0..self.len())
            .filter(|&row| self.row_batches[row] == batch && self.is_live(row))
            .map(|row| self.chunks[row].clone())
            .collect()
    }

    fn held_by_newer_batch(&self, chunk_id: &str, batch: BatchId) -> bool {
        self.by_id.get(chunk_id).is_some_and(|&row| self.row_batches[row] > batch)
    }

    fn is_live(&self, row: usize) -> bool {
        self.chunks.get(row).is_some_and(|chunk| self.by_id.get(&chunk.chunk_id) == Some(&row))
    }

    pub fn is_trained(&self) -> bool {
        self.ivf.is_some()
    }

    /// Appends a batch under the next batch id and returns that id.
    pub fn add(&mut self, vectors: &[Vec<f32>], chunks: &[Chunk]) -> Result<BatchId> {
        let batch = self.last_batch().map_or(BatchId(1), BatchId::next);
        self.add_with_batch(vectors, chunks, batch)?;
        Ok(batch)
    }

    /// Appends `vectors[i]` for `chunks[i]` and records `batch`, even when
    /// the batch is empty. A chunk already written by a newer batch is
    /// skipped. The whole batch is validated before anything is stored.
    pub fn add_with_batch(&mut self, vectors: &[Vec<f32>], chunks: &[Chunk], batch: BatchId) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(VectorIndexError::LengthMismatch { vectors: vectors.len(), chunks: chunks.len() });
        }
        let dim = self.config.dim;
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(VectorIndexError::DimensionMismatch { expected: dim, actual: bad.len() });
        }

        let first_row = self.len();
        self.vectors.reserve(vectors.len() * dim);
        let mut skipped = 0;
        for (vector, chunk) in vectors.iter().zip(chunks) {
            if self.held_by_newer_batch(&chunk.chunk_id, batch) {
                skipped += 1;
                continue;
            }
            self.push_row(vector, chunk.clone(), batch, self.config.normalize);
        }
        if skipped > 0 {
            debug!(skipped, batch = %batch, "kept rows written by newer batches");
        }
        self.batches.insert(batch);
        info!(rows = vectors.len(), first_row, total = self.len(), batch = %batch, "added vectors");

        if let Some(threshold) = self.config.train_threshold() {
            if self.ivf.is_none() && self.len() >= threshold {
                self.train_on_rows()?;
            }
        }
        Ok(())
    }

    fn push_row(&mut self, vector: &[f32], chunk: Chunk, batch: BatchId, normalize: bool) {
        let dim = self.config.dim;
        let row = self.len();
        let start = self.vectors.len();
        self.vectors.extend_from_slice(vector);
        if normalize {
            ivf::normalize(&mut self.vectors[start..]);
        }
        if let Some(state) = self.ivf.as_mut() {
            state.assign(dim, row, &self.vectors[start..]);
        }
        self.by_id.insert(chunk.chunk_id.clone(), row);
        self.chunks.push(chunk);
        self.row_batches.push(batch);
    }

    /// Trains inverted-file cells from `sample` and assigns every stored row.
    /// A no-op for flat families.
    pub fn train(&mut self, sample: &[Vec<f32>]) -> Result<()> {
        let dim = self.config.dim;
        if let Some(bad) = sample.iter().find(|v| v.len() != dim) {
            return Err(VectorIndexError::DimensionMismatch { expected: dim, actual: bad.len() });
        }
        let mut flat = Vec::with_capacity(sample.len() * dim);
        for v in sample {
            let start = flat.len();
            flat.extend_from_slice(v);
            if self.config.normalize {
                ivf::normalize(&mut flat[start..]);
            }
        }
        self.train_flat(&flat)
    }

    fn train_on_rows(&mut self) -> Result<()> {
        let rows = std::mem::take(&mut self.vectors);
        let result = self.train_flat(&rows);
        self.vectors = rows;
        if result.is_ok() {
            self.assign_all();
        }
        result
    }

    fn train_flat(&mut self, sample: &[f32]) -> Result<()> {
        let IndexFamily::Ivf { nlist, .. } = self.config.family else {
            return Ok(());
        };
        let got = sample.len() / self.config.dim;
        if got < nlist {
            return Err(VectorIndexError::InsufficientTrainingData { needed: nlist, got });
        }
        self.ivf = Some(IvfState::train(sample, self.config.dim, nlist, self.config.normalize));
        self.assign_all();
        info!(nlist, sample = got, rows = self.len(), "trained inverted file");
        Ok(())
    }

    fn assign_all(&mut self) {
        let dim = self.config.dim;
        if let Some(state) = self.ivf.as_mut() {
            state.lists.iter_mut().for_each(Vec::clear);
            for (row, vector) in self.vectors.chunks_exact(dim).enumerate() {
                state.assign(dim, row, vector);
            }
        }
    }

    /// Up to `top_k` chunks by descending similarity; equal scores keep
    /// insertion order. Only the latest row of each chunk id is scored. An
    /// untrained inverted file is searched exhaustively.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorHit>> {
        let rows = self.len();
        if rows == 0 {
            return Err(VectorIndexError::EmptyIndex);
        }
        let dim = self.config.dim;
        if query.len() != dim {
            return Err(VectorIndexError::DimensionMismatch { expected: dim, actual: query.len() });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut q = query.to_vec();
        if self.config.normalize {
            ivf::normalize(&mut q);
        }

        let candidates: Vec<usize> = match (&self.ivf, self.config.family) {
            (Some(state), IndexFamily::Ivf { nprobe, .. }) => state.probe(dim, &q, nprobe),
            _ => (0..rows).collect(),
        };
        let mut scored: Vec<(usize, f32)> = candidates
            .into_iter()
            .filter(|&row| row < rows && self.is_live(row))
            .map(|row| (row, ivf::similarity(self.config.family, &q, &self.vectors[row * dim..(row + 1) * dim])))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(top_k);
        debug!(top_k, hits = scored.len(), "vector search");

        Ok(scored
            .into_iter()
            .filter_map(|(row, score)| self.chunks.get(row).map(|chunk| VectorHit { chunk: chunk.clone(), score }))
            .collect())
    }

    /// Latest chunk stored under `chunk_id`.
    pub fn get(&self, chunk_id: &str) -> Option<&Chunk> {
        self.by_id.get(chunk_id).and_then(|&row| self.chunks.get(row))
    }

    pub fn stats(&self) -> VectorStats {
        VectorStats {
            total_vectors: self.vectors.len() / self.config.dim,
            dim: self.config.dim,
            num_chunks: self.live_len(),
            family: self.config.family,
            trained: self.is_trained(),
            last_batch: self.last_batch(),
        }
    }

    /// Fresh index holding the current rows whose chunk satisfies `keep`,
    /// in their original order and with their original batch ids.
    /// Superseded rows are dropped. Rows are never removed in place.
    pub fn rebuild_retaining<F>(&self, keep: F) -> Result<Self>
    where
        F: Fn(&Chunk) -> bool,
    {
        let dim = self.config.dim;
        let mut rebuilt = Self::new(self.config.clone())?;
        for (row, vector) in self.vectors.chunks_exact(dim).enumerate() {
            let chunk = &self.chunks[row];
            if self.is_live(row) && keep(chunk) {
                // stored rows are already normalized when configured
                rebuilt.push_row(vector, chunk.clone(), self.row_batches[row], false);
            }
        }
        rebuilt.batches = self.batches.clone();
        if let Some(threshold) = rebuilt.config.train_threshold() {
            if rebuilt.len() >= threshold {
                rebuilt.train_on_rows()?;
            }
        }
        info!(before = self.len(), after = rebuilt.len(), "rebuilt vector index");
        Ok(rebuilt)
    }
}
