//! passagedb-text
//!
//! Keyword retrieval: chunk rows live in SQLite, and a Tantivy BM25 index is
//! derived from them. Both record the last ingested batch so drift between
//! them can be detected and repaired with [`LexicalIndex::rebuild`].

mod error;
mod index;
pub mod row_store;
pub mod tantivy_utils;

pub use error::{LexicalIndexError, Result};
pub use index::{IntegrityReport, LexicalHit, LexicalIndex};

use passagedb_core::traits::KeywordIndex;
use passagedb_core::{BatchId, Chunk, Meta, SearchResult, SourceKind};

impl From<LexicalHit> for SearchResult {
	fn from(hit: LexicalHit) -> Self {
		let mut metadata = Meta::new();
		if !hit.section.is_empty() {
			metadata.insert("section".to_string(), hit.section);
		}
		SearchResult {
			chunk_id: hit.chunk_id,
			doc_id: hit.doc_id,
			text: hit.text,
			score: hit.score,
			metadata,
			source: SourceKind::Keyword,
		}
	}
}

impl KeywordIndex for LexicalIndex {
	fn row_count(&self) -> anyhow::Result<usize> {
		Ok(LexicalIndex::row_count(self)?)
	}

	fn last_batch(&self) -> anyhow::Result<Option<BatchId>> {
		Ok(LexicalIndex::last_batch(self)?)
	}

	fn batches(&self) -> anyhow::Result<Vec<BatchId>> {
		Ok(LexicalIndex::batches(self)?)
	}

	fn batch_chunks(&self, batch: BatchId) -> anyhow::Result<Vec<Chunk>> {
		Ok(LexicalIndex::batch_chunks(self, batch)?)
	}

	fn upsert_batch(&self, chunks: &[Chunk], batch: BatchId) -> anyhow::Result<()> {
		Ok(LexicalIndex::upsert_batch(self, chunks, batch)?)
	}

	fn search_keyword(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchResult>> {
		Ok(self.search(query, k)?.into_iter().map(SearchResult::from).collect())
	}

	fn in_sync(&self) -> anyhow::Result<bool> {
		Ok(self.check_integrity()?.in_sync)
	}

	fn rebuild(&self) -> anyhow::Result<()> {
		LexicalIndex::rebuild(self)?;
		Ok(())
	}
}
