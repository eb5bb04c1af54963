use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use passagedb_core::traits::{DenseIndex, Embedder, KeywordIndex};
use passagedb_core::{BatchId, Chunk, SearchMode, SearchResult, SourceKind};

use crate::config::RetrievalConfig;
use crate::error::{Result, RetrievalError};
use crate::fusion::fuse;

/// Sizes and batch ledgers of both stores. The stores are consistent when
/// each committed exactly the same batches and the keyword search structure
/// agrees with its rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub dense_rows: usize,
    pub keyword_rows: usize,
    pub dense_batch: Option<BatchId>,
    pub keyword_batch: Option<BatchId>,
    /// Committed to the keyword store only.
    pub missing_from_dense: Vec<BatchId>,
    /// Committed to the dense store only.
    pub missing_from_keyword: Vec<BatchId>,
    pub keyword_in_sync: bool,
    pub consistent: bool,
}

/// Runs dense and keyword retrieval side by side and fuses the two lists.
pub struct HybridRetriever<D, K> {
    dense: Arc<RwLock<D>>,
    keyword: Arc<K>,
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl<D, K> HybridRetriever<D, K>
where
    D: DenseIndex + 'static,
    K: KeywordIndex + 'static,
{
    pub fn new(dense: D, keyword: K, embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self { dense: Arc::new(RwLock::new(dense)), keyword: Arc::new(keyword), embedder, config }
    }

    pub fn dense(&self) -> &Arc<RwLock<D>> {
        &self.dense
    }

    pub fn keyword(&self) -> &Arc<K> {
        &self.keyword
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embeds `chunks` and writes them to both stores under one new batch id.
    /// The dense side is written first; a failure on the keyword side leaves
    /// that batch in the dense ledger only, which [`HybridRetriever::status`]
    /// reports and [`HybridRetriever::repair`] replays.
    pub fn ingest(&self, chunks: &[Chunk]) -> Result<Option<BatchId>> {
        if chunks.is_empty() {
            return Ok(None);
        }
        let dense_last = self.dense.read().last_batch();
        let keyword_last = self.keyword.last_batch().map_err(RetrievalError::Keyword)?;
        let batch = dense_last.max(keyword_last).map_or(BatchId(1), BatchId::next);

        let vectors = self.embed_chunks(chunks)?;
        self.dense.write().add_batch(&vectors, chunks, batch).map_err(RetrievalError::Dense)?;
        self.keyword.upsert_batch(chunks, batch).map_err(RetrievalError::Keyword)?;
        info!(chunks = chunks.len(), batch = %batch, "ingested batch");
        Ok(Some(batch))
    }

    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let pb = progress_bar(chunks.len(), self.config.show_progress);
        let mut vectors = Vec::with_capacity(chunks.len());
        for group in chunks.chunks(self.config.embed_batch_size.max(1)) {
            let texts: Vec<String> = group.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed_batch(&texts).map_err(RetrievalError::Embedding)?;
            if embedded.len() != texts.len() {
                return Err(RetrievalError::Embedding(anyhow::anyhow!(
                    "embedder returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            pb.inc(group.len() as u64);
        }
        pb.finish_and_clear();
        Ok(vectors)
    }

    /// Hybrid search with the configured `top_k`.
    pub async fn search_with_defaults(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.search(query, self.config.top_k, SearchMode::Hybrid).await
    }

    /// Vector and keyword modes surface their errors. Hybrid mode never
    /// fails: if one side errors or times out the other side's list is
    /// returned as is, and if both fail the result is empty.
    pub async fn search(&self, query: &str, top_k: usize, mode: SearchMode) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let mut results = match mode {
            SearchMode::Vector => self.vector_search(query, top_k).await?,
            SearchMode::Keyword => self.keyword_search(query, top_k).await?,
            SearchMode::Hybrid => self.hybrid_search(query, top_k).await,
        };
        results.truncate(top_k);
        Ok(results)
    }

    async fn hybrid_search(&self, query: &str, top_k: usize) -> Vec<SearchResult> {
        let candidates = self.config.candidates(top_k);
        let (vector, keyword) = tokio::join!(self.vector_search(query, candidates), self.keyword_search(query, candidates));
        match (vector, keyword) {
            (Ok(vector), Ok(keyword)) => {
                debug!(vector = vector.len(), keyword = keyword.len(), "fusing result lists");
                fuse(&self.config.fusion, &vector, &keyword)
            }
            (Ok(vector), Err(err)) => {
                warn!(error = %err, "keyword search failed, returning vector results only");
                vector
            }
            (Err(err), Ok(keyword)) => {
                warn!(error = %err, "vector search failed, returning keyword results only");
                keyword
            }
            (Err(vector_err), Err(keyword_err)) => {
                warn!(vector_error = %vector_err, keyword_error = %keyword_err, "both searches failed");
                Vec::new()
            }
        }
    }

    async fn vector_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let dense = Arc::clone(&self.dense);
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let vector = embedder.embed(&query).map_err(RetrievalError::Embedding)?;
            dense.read().search_dense(&vector, k).map_err(RetrievalError::Dense)
        });
        self.bounded(task, SourceKind::Vector).await
    }

    async fn keyword_search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let keyword = Arc::clone(&self.keyword);
        let query = query.to_string();
        let task = tokio::task::spawn_blocking(move || keyword.search_keyword(&query, k).map_err(RetrievalError::Keyword));
        self.bounded(task, SourceKind::Keyword).await
    }

    async fn bounded(&self, task: JoinHandle<Result<Vec<SearchResult>>>, side: SourceKind) -> Result<Vec<SearchResult>> {
        match self.config.sub_search_timeout() {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined?,
                Err(_) => Err(RetrievalError::Timeout { side }),
            },
            None => task.await?,
        }
    }

    pub fn status(&self) -> Result<ReconciliationReport> {
        let (dense_rows, dense_batch, dense_batches) = {
            let dense = self.dense.read();
            (dense.row_count(), dense.last_batch(), dense.batches())
        };
        let keyword_rows = self.keyword.row_count().map_err(RetrievalError::Keyword)?;
        let keyword_batch = self.keyword.last_batch().map_err(RetrievalError::Keyword)?;
        let keyword_batches = self.keyword.batches().map_err(RetrievalError::Keyword)?;
        let keyword_in_sync = self.keyword.in_sync().map_err(RetrievalError::Keyword)?;

        let missing_from_dense = absent_from(&keyword_batches, &dense_batches);
        let missing_from_keyword = absent_from(&dense_batches, &keyword_batches);
        let consistent = keyword_in_sync && missing_from_dense.is_empty() && missing_from_keyword.is_empty();
        if !consistent {
            warn!(?missing_from_dense, ?missing_from_keyword, keyword_in_sync, "dense and keyword stores have drifted");
        }
        Ok(ReconciliationReport {
            dense_rows,
            keyword_rows,
            dense_batch,
            keyword_batch,
            missing_from_dense,
            missing_from_keyword,
            keyword_in_sync,
            consistent,
        })
    }

    /// Replays every batch that only one store committed into the other,
    /// oldest first, then rebuilds the keyword search structure if it has
    /// drifted from its rows. Both stores keep the newest batch's version of
    /// a chunk, so replay order does not matter.
    pub fn repair(&self) -> Result<ReconciliationReport> {
        let before = self.status()?;
        if before.consistent {
            return Ok(before);
        }
        for &batch in &before.missing_from_keyword {
            let chunks = self.dense.read().batch_chunks(batch);
            self.keyword.upsert_batch(&chunks, batch).map_err(RetrievalError::Keyword)?;
            info!(batch = %batch, chunks = chunks.len(), "replayed batch into keyword store");
        }
        for &batch in &before.missing_from_dense {
            let chunks = self.keyword.batch_chunks(batch).map_err(RetrievalError::Keyword)?;
            let vectors = self.embed_chunks(&chunks)?;
            self.dense.write().add_batch(&vectors, &chunks, batch).map_err(RetrievalError::Dense)?;
            info!(batch = %batch, chunks = chunks.len(), "replayed batch into dense store");
        }
        if !before.keyword_in_sync {
            self.keyword.rebuild().map_err(RetrievalError::Keyword)?;
            info!("rebuilt keyword search structure");
        }
        self.status()
    }
}

fn absent_from(ids: &[BatchId], other: &[BatchId]) -> Vec<BatchId> {
    ids.iter().filter(|id| other.binary_search(id).is_err()).copied().collect()
}

fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}
