use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use passagedb_core::traits::KeywordIndex;
use passagedb_core::{BatchId, Chunk, Chunker, ChunkingConfig, Document, Meta, SearchMode, SearchResult, SourceKind};
use passagedb_embed::HashingEmbedder;
use passagedb_hybrid::{FusionStrategy, HybridRetriever, PassageRetriever, RetrievalConfig, RetrievalError};
use passagedb_text::row_store::ROW_STORE_FILE;
use passagedb_text::LexicalIndex;
use passagedb_vector::{IndexFamily, VectorIndex, VectorIndexConfig};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DIM: usize = 128;

fn corpus() -> Vec<Chunk> {
    let chunker = Chunker::new(ChunkingConfig { chunk_size_tokens: 40, chunk_overlap_tokens: 8, min_chunk_length: 20, by_sections: false })
        .expect("chunker");
    let docs = vec![
        Document::new(
            "attn",
            "Attention Is All You Need",
            "The transformer relies entirely on attention. Self attention relates positions of a sequence. \
             Multi head attention lets the model attend to different subspaces.",
        ),
        Document::new(
            "soil",
            "Soil Moisture Sensing",
            "Capacitive probes estimate soil moisture. Irrigation schedules depend on moisture readings. \
             Calibration against gravimetric samples improves accuracy.",
        ),
        Document::new(
            "graph",
            "Graph Neural Networks",
            "Message passing aggregates neighbour features. Graph convolution generalises convolution to graphs.",
        ),
    ];
    chunker.chunk_batch(&docs)
}

fn retriever(config: RetrievalConfig) -> HybridRetriever<VectorIndex, LexicalIndex> {
    HybridRetriever::new(
        VectorIndex::create(DIM, IndexFamily::FlatIp).expect("vector index"),
        LexicalIndex::in_memory().expect("lexical index"),
        Arc::new(HashingEmbedder::new(DIM)),
        config,
    )
}

#[tokio::test]
async fn hybrid_search_fuses_both_sides() {
    let r = retriever(RetrievalConfig::default());
    let chunks = corpus();
    assert_eq!(r.ingest(&chunks).unwrap(), Some(BatchId(1)));

    let results = r.search("soil moisture irrigation", 3, SearchMode::Hybrid).await.unwrap();
    assert!(!results.is_empty() && results.len() <= 3);
    assert_eq!(results[0].doc_id, "soil");
    assert!(results.iter().all(|res| res.source == SourceKind::Hybrid));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let status = r.status().unwrap();
    assert!(status.consistent);
    assert_eq!(status.dense_rows, chunks.len());
    assert_eq!(status.keyword_rows, chunks.len());
    assert_eq!(status.dense_batch, Some(BatchId(1)));
}

#[tokio::test]
async fn single_modes_tag_their_source() {
    let r = retriever(RetrievalConfig::default());
    r.ingest(&corpus()).unwrap();

    let vector = r.search("attention transformer", 2, SearchMode::Vector).await.unwrap();
    assert!(vector.iter().all(|res| res.source == SourceKind::Vector));
    assert_eq!(vector[0].doc_id, "attn");

    let keyword = r.search("graph convolution", 2, SearchMode::Keyword).await.unwrap();
    assert!(keyword.iter().all(|res| res.source == SourceKind::Keyword));
    assert_eq!(keyword[0].doc_id, "graph");

    assert!(r.search("anything", 0, SearchMode::Hybrid).await.unwrap().is_empty());
}

#[tokio::test]
async fn weighted_fusion_is_configurable() {
    let config = RetrievalConfig {
        fusion: FusionStrategy::Weighted { vector_weight: 0.3, keyword_weight: 0.7 },
        ..RetrievalConfig::default()
    };
    let r = retriever(config);
    r.ingest(&corpus()).unwrap();
    let results = r.search_with_defaults("message passing graph").await.unwrap();
    assert_eq!(results[0].doc_id, "graph");
    assert!(results[0].score <= 1.0 + 1e-6);
}

#[tokio::test]
async fn repeated_ingest_advances_the_batch() {
    let r = retriever(RetrievalConfig::default());
    let chunks = corpus();
    r.ingest(&chunks[..2]).unwrap();
    assert_eq!(r.ingest(&chunks[2..]).unwrap(), Some(BatchId(2)));
    assert_eq!(r.ingest(&[]).unwrap(), None);
    assert_eq!(r.status().unwrap().keyword_batch, Some(BatchId(2)));
}

#[tokio::test]
async fn empty_stores_yield_empty_hybrid_results() {
    let r = retriever(RetrievalConfig::default());
    assert!(r.search("nothing here", 5, SearchMode::Hybrid).await.unwrap().is_empty());
    let err = r.search("nothing here", 5, SearchMode::Vector).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Dense(_)));
}

/// Keyword side that can fail, stall, and records the requested depth.
#[derive(Default)]
struct StubKeyword {
    fail: bool,
    delay: Option<Duration>,
    requested: AtomicUsize,
}

impl KeywordIndex for StubKeyword {
    fn row_count(&self) -> anyhow::Result<usize> {
        Ok(0)
    }

    fn last_batch(&self) -> anyhow::Result<Option<BatchId>> {
        Ok(None)
    }

    fn batches(&self) -> anyhow::Result<Vec<BatchId>> {
        Ok(Vec::new())
    }

    fn batch_chunks(&self, _batch: BatchId) -> anyhow::Result<Vec<Chunk>> {
        Ok(Vec::new())
    }

    fn upsert_batch(&self, _chunks: &[Chunk], _batch: BatchId) -> anyhow::Result<()> {
        Ok(())
    }

    fn search_keyword(&self, _query: &str, k: usize) -> anyhow::Result<Vec<SearchResult>> {
        self.requested.store(k, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            anyhow::bail!("keyword backend unavailable");
        }
        Ok(vec![SearchResult {
            chunk_id: "kw_chunk_0".into(),
            doc_id: "kw".into(),
            text: "keyword only".into(),
            score: 3.0,
            metadata: Meta::new(),
            source: SourceKind::Keyword,
        }])
    }
}

fn stubbed(keyword: StubKeyword, config: RetrievalConfig) -> HybridRetriever<VectorIndex, StubKeyword> {
    let r = HybridRetriever::new(
        VectorIndex::create(DIM, IndexFamily::FlatIp).expect("vector index"),
        keyword,
        Arc::new(HashingEmbedder::new(DIM)),
        config,
    );
    r.ingest(&corpus()).expect("ingest");
    r
}

#[tokio::test]
async fn failed_keyword_side_degrades_to_vector_results() {
    let r = stubbed(StubKeyword { fail: true, ..StubKeyword::default() }, RetrievalConfig::default());
    let results = r.search("soil moisture", 2, SearchMode::Hybrid).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|res| res.source == SourceKind::Vector));

    let err = r.search("soil moisture", 2, SearchMode::Keyword).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Keyword(_)));
}

#[tokio::test]
async fn sub_searches_request_twice_top_k() {
    let r = stubbed(StubKeyword::default(), RetrievalConfig::default());
    let results = r.search("attention", 3, SearchMode::Hybrid).await.unwrap();
    assert_eq!(r.keyword().requested.load(Ordering::SeqCst), 6);
    assert!(results.len() <= 3);
    assert!(results.iter().any(|res| res.chunk_id == "kw_chunk_0"));
}

#[tokio::test]
async fn slow_keyword_side_times_out() {
    let config = RetrievalConfig { sub_search_timeout_ms: Some(50), ..RetrievalConfig::default() };
    let slow = StubKeyword { delay: Some(Duration::from_millis(400)), ..StubKeyword::default() };
    let r = stubbed(slow, config);

    let results = r.search("graph", 2, SearchMode::Hybrid).await.unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|res| res.source == SourceKind::Vector));

    let err = r.search("graph", 2, SearchMode::Keyword).await.unwrap_err();
    assert!(matches!(err, RetrievalError::Timeout { side: SourceKind::Keyword }));
}

#[tokio::test]
async fn passage_retriever_persists_across_reopen() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashingEmbedder::new(DIM));
    let vector = VectorIndexConfig::new(DIM, IndexFamily::FlatIp);
    {
        let r = PassageRetriever::open(tmp.path(), vector.clone(), RetrievalConfig::default(), embedder.clone()).unwrap();
        r.ingest(&corpus()).unwrap();
        r.save(tmp.path()).unwrap();
    }
    let r = PassageRetriever::open(tmp.path(), vector, RetrievalConfig::default(), embedder).unwrap();
    let status = r.status().unwrap();
    assert!(status.consistent);
    assert_eq!(status.dense_batch, Some(BatchId(1)));
    let results = r.search("self attention", 1, SearchMode::Hybrid).await.unwrap();
    assert_eq!(results[0].doc_id, "attn");

    let wrong_dim = VectorIndexConfig::new(DIM / 2, IndexFamily::FlatIp);
    assert!(PassageRetriever::open(tmp.path(), wrong_dim, RetrievalConfig::default(), Arc::new(HashingEmbedder::new(DIM))).is_err());
}

#[tokio::test]
async fn reingested_chunk_replaces_its_old_text() {
    let r = retriever(RetrievalConfig::default());
    let chunks = corpus();
    r.ingest(&chunks).unwrap();

    let mut rewritten = chunks.iter().find(|c| c.doc_id == "graph").cloned().unwrap();
    rewritten.text = "Spectral clustering partitions graphs with Laplacian eigenvectors.".to_string();
    assert_eq!(r.ingest(std::slice::from_ref(&rewritten)).unwrap(), Some(BatchId(2)));

    let vector = r.search(&rewritten.text, 50, SearchMode::Vector).await.unwrap();
    let copies: Vec<_> = vector.iter().filter(|res| res.chunk_id == rewritten.chunk_id).collect();
    assert_eq!(copies.len(), 1);
    assert_eq!(copies[0].text, rewritten.text);
    assert_eq!(vector.len(), chunks.len());

    let hybrid = r.search("spectral clustering laplacian eigenvectors", 3, SearchMode::Hybrid).await.unwrap();
    assert_eq!(hybrid[0].chunk_id, rewritten.chunk_id);
    assert_eq!(hybrid[0].text, rewritten.text);

    let status = r.status().unwrap();
    assert!(status.consistent);
    assert_eq!((status.dense_rows, status.keyword_rows), (chunks.len(), chunks.len()));
}

/// Real lexical index whose next write can be made to fail.
struct FlakyKeyword {
    inner: LexicalIndex,
    fail_next: AtomicBool,
}

impl KeywordIndex for FlakyKeyword {
    fn row_count(&self) -> anyhow::Result<usize> {
        KeywordIndex::row_count(&self.inner)
    }

    fn last_batch(&self) -> anyhow::Result<Option<BatchId>> {
        KeywordIndex::last_batch(&self.inner)
    }

    fn batches(&self) -> anyhow::Result<Vec<BatchId>> {
        KeywordIndex::batches(&self.inner)
    }

    fn batch_chunks(&self, batch: BatchId) -> anyhow::Result<Vec<Chunk>> {
        KeywordIndex::batch_chunks(&self.inner, batch)
    }

    fn upsert_batch(&self, chunks: &[Chunk], batch: BatchId) -> anyhow::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("keyword store write rejected");
        }
        KeywordIndex::upsert_batch(&self.inner, chunks, batch)
    }

    fn search_keyword(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchResult>> {
        self.inner.search_keyword(query, k)
    }

    fn in_sync(&self) -> anyhow::Result<bool> {
        KeywordIndex::in_sync(&self.inner)
    }

    fn rebuild(&self) -> anyhow::Result<()> {
        KeywordIndex::rebuild(&self.inner)
    }
}

#[tokio::test]
async fn lost_keyword_batch_stays_visible_until_repaired() {
    let keyword = FlakyKeyword { inner: LexicalIndex::in_memory().unwrap(), fail_next: AtomicBool::new(true) };
    let r = HybridRetriever::new(
        VectorIndex::create(DIM, IndexFamily::FlatIp).unwrap(),
        keyword,
        Arc::new(HashingEmbedder::new(DIM)),
        RetrievalConfig::default(),
    );
    let chunks = corpus();
    let split = chunks.iter().position(|c| c.doc_id == "graph").unwrap();

    let err = r.ingest(&chunks[..split]).unwrap_err();
    assert!(matches!(err, RetrievalError::Keyword(_)));
    assert_eq!(r.ingest(&chunks[split..]).unwrap(), Some(BatchId(2)));

    let status = r.status().unwrap();
    assert_eq!(status.dense_batch, status.keyword_batch);
    assert_eq!(status.missing_from_keyword, vec![BatchId(1)]);
    assert!(status.missing_from_dense.is_empty());
    assert!(!status.consistent);
    assert!(r.search("soil moisture", 3, SearchMode::Keyword).await.unwrap().is_empty());

    let repaired = r.repair().unwrap();
    assert!(repaired.consistent);
    assert!(repaired.missing_from_keyword.is_empty());
    assert_eq!(repaired.keyword_batch, Some(BatchId(2)));
    assert_eq!((repaired.dense_rows, repaired.keyword_rows), (chunks.len(), chunks.len()));
    let keyword = r.search("soil moisture", 3, SearchMode::Keyword).await.unwrap();
    assert_eq!(keyword[0].doc_id, "soil");
}

/// Saves one ingested batch under `dir`, then writes a row straight into the
/// row store so the search index no longer covers it.
fn desynced_store(dir: &std::path::Path, embedder: Arc<HashingEmbedder>) {
    let vector = VectorIndexConfig::new(DIM, IndexFamily::FlatIp);
    {
        let r = PassageRetriever::open(dir, vector, RetrievalConfig::default(), embedder).unwrap();
        r.ingest(&corpus()).unwrap();
        r.save(dir).unwrap();
    }
    let conn = rusqlite::Connection::open(dir.join(ROW_STORE_FILE)).unwrap();
    conn.execute(
        "INSERT INTO chunks (chunk_id, doc_id, text, start_offset, end_offset, batch_id) VALUES ('x_chunk_0', 'x', 'spectral clustering', 0, 19, 1)",
        [],
    )
    .unwrap();
}

#[tokio::test]
async fn lexical_desync_on_open_is_reported_and_repairable() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashingEmbedder::new(DIM));
    desynced_store(tmp.path(), embedder.clone());

    let vector = VectorIndexConfig::new(DIM, IndexFamily::FlatIp);
    let r = PassageRetriever::open(tmp.path(), vector, RetrievalConfig::default(), embedder).unwrap();
    let status = r.status().unwrap();
    assert!(!status.keyword_in_sync);
    assert!(!status.consistent);
    assert!(status.missing_from_keyword.is_empty() && status.missing_from_dense.is_empty());

    let repaired = r.repair().unwrap();
    assert!(repaired.keyword_in_sync && repaired.consistent);
    let hits = r.search("spectral clustering", 1, SearchMode::Keyword).await.unwrap();
    assert_eq!(hits[0].chunk_id, "x_chunk_0");
}

#[tokio::test]
async fn rebuild_on_open_restores_lexical_sync() {
    let tmp = TempDir::new().unwrap();
    let embedder = Arc::new(HashingEmbedder::new(DIM));
    desynced_store(tmp.path(), embedder.clone());

    let config = RetrievalConfig { rebuild_on_open: true, ..RetrievalConfig::default() };
    let vector = VectorIndexConfig::new(DIM, IndexFamily::FlatIp);
    let r = PassageRetriever::open(tmp.path(), vector, config, embedder).unwrap();
    let status = r.status().unwrap();
    assert!(status.keyword_in_sync);
    assert!(status.consistent);
    assert_eq!(status.keyword_rows, corpus().len() + 1);
}
