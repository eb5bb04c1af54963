//! Chunk a handful of abstracts, ingest them into an on-disk retriever and
//! run one query in each search mode.
//!
//! cargo run -p passagedb-hybrid --example ingest_and_search -- "attention heads"

use std::sync::Arc;

use passagedb_core::config::Config;
use passagedb_core::{logging, Chunker, ChunkingConfig, Document, SearchMode};
use passagedb_embed::{CheckedEmbedder, HashingEmbedder};
use passagedb_hybrid::{PassageRetriever, RetrievalConfig};
use passagedb_vector::VectorIndexConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("info")?;
    let config = Config::load()?;
    let chunking: ChunkingConfig = config.section("chunking")?;
    let vector: VectorIndexConfig = config.section("vector")?;
    let retrieval: RetrievalConfig = config.section("retrieval")?;
    let index_dir = config.index_dir()?;

    let embedder = Arc::new(CheckedEmbedder::new(HashingEmbedder::new(vector.dim)));
    let retriever = PassageRetriever::open(&index_dir, vector, retrieval, embedder)?;

    let chunker = Chunker::new(chunking)?;
    let docs = vec![
        Document::new(
            "1706.03762",
            "Attention Is All You Need",
            "Abstract\nThe dominant sequence transduction models are based on recurrent or convolutional networks. \
             We propose the Transformer, based solely on attention mechanisms. \
             Multi-head attention allows the model to jointly attend to information from different subspaces.",
        ),
        Document::new(
            "2005.11401",
            "Retrieval-Augmented Generation",
            "Abstract\nLarge pre-trained language models store factual knowledge in their parameters. \
             We combine a parametric generator with a dense passage retriever over Wikipedia. \
             Retrieval-augmented models generate more specific and factual language.",
        ),
    ];
    let chunks = chunker.chunk_batch(&docs);
    if let Some(batch) = retriever.ingest(&chunks)? {
        println!("ingested {} chunks as batch {batch}", chunks.len());
    }
    retriever.save(&index_dir)?;

    let query = std::env::args().nth(1).unwrap_or_else(|| "attention heads".to_string());
    for mode in [SearchMode::Vector, SearchMode::Keyword, SearchMode::Hybrid] {
        println!("\n== {query:?} ({mode:?})");
        match retriever.search(&query, retriever.config().top_k, mode).await {
            Ok(results) => {
                for r in results {
                    println!("{:>8.4}  {:<8} {}  {}", r.score, r.source, r.chunk_id, r.text.chars().take(80).collect::<String>());
                }
            }
            Err(err) => println!("search failed: {err}"),
        }
    }
    println!("\n{:?}", retriever.status()?);
    Ok(())
}
