use parking_lot::Mutex;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

use passagedb_core::{BatchId, Chunk, Document};

use crate::error::{LexicalIndexError, Result};
use crate::row_store::{self, IndexedRow, ROW_STORE_FILE};
use crate::tantivy_utils::{build_schema, register_tokenizer, Fields};

const TANTIVY_DIR: &str = "tantivy";
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// A ranked keyword hit. `score` is BM25, higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
	pub chunk_id: String,
	pub doc_id: String,
	pub text: String,
	pub section: String,
	pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
	pub rows: usize,
	pub indexed: usize,
	pub row_batch: Option<BatchId>,
	pub index_batch: Option<BatchId>,
	pub in_sync: bool,
}

struct Store {
	conn: Connection,
	writer: IndexWriter,
}

/// Keyword index: SQLite rows plus a Tantivy BM25 index derived from them.
/// A single writer is serialized behind the store lock; searches only touch
/// the Tantivy reader.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	fields: Fields,
	store: Mutex<Store>,
}

impl LexicalIndex {
	/// Open or create `dir/rows.sqlite3` and `dir/tantivy/`.
	pub fn open(dir: &Path) -> Result<Self> {
		let tantivy_dir = dir.join(TANTIVY_DIR);
		fs::create_dir_all(&tantivy_dir)?;
		let conn = Connection::open(dir.join(ROW_STORE_FILE))?;
		let index = Index::open_or_create(MmapDirectory::open(&tantivy_dir)?, build_schema())?;
		let this = Self::from_parts(conn, index)?;
		let report = this.check_integrity()?;
		if !report.in_sync {
			warn!(rows = report.rows, indexed = report.indexed, "lexical index out of sync with row store");
		}
		info!(dir = %dir.display(), rows = report.rows, "opened lexical index");
		Ok(this)
	}

	pub fn in_memory() -> Result<Self> {
		Self::from_parts(Connection::open_in_memory()?, Index::create_in_ram(build_schema()))
	}

	fn from_parts(conn: Connection, index: Index) -> Result<Self> {
		row_store::init(&conn)?;
		register_tokenizer(&index);
		let fields = Fields::from_schema(&index.schema())?;
		let reader: IndexReader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		let writer: IndexWriter = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		Ok(Self { index, reader, fields, store: Mutex::new(Store { conn, writer }) })
	}

	pub fn add_chunk(&self, chunk: &Chunk) -> Result<BatchId> {
		self.add_chunks_batch(std::slice::from_ref(chunk))
	}

	/// Upserts under the next batch id and returns it.
	pub fn add_chunks_batch(&self, chunks: &[Chunk]) -> Result<BatchId> {
		let batch = self.last_batch()?.map_or(BatchId(1), BatchId::next);
		self.upsert_batch(chunks, batch)?;
		Ok(batch)
	}

	/// Upserts rows and their search entries. Rows are written in one SQLite
	/// transaction that commits only after the search index commit, which
	/// carries the store's last batch as its payload.
	pub fn upsert_batch(&self, chunks: &[Chunk], batch: BatchId) -> Result<()> {
		let mut store = self.store.lock();
		let Store { conn, writer } = &mut *store;
		let tx = conn.transaction()?;
		let upserted = row_store::upsert_chunks(&tx, chunks, batch)?;

		let indexed = (|| -> Result<()> {
			for c in upserted.applied.iter().map(|&i| &chunks[i]) {
				writer.delete_term(Term::from_field_text(self.fields.chunk_id, &c.chunk_id));
				writer.add_document(self.to_document(&c.chunk_id, &c.doc_id, &c.text, c.section()))?;
			}
			let mut prepared = writer.prepare_commit()?;
			prepared.set_payload(&upserted.last.0.to_string());
			prepared.commit()?;
			Ok(())
		})();
		if let Err(err) = indexed {
			if let Err(rollback) = writer.rollback() {
				warn!(error = %rollback, "search index rollback failed");
			}
			return Err(err);
		}

		tx.commit()?;
		self.reader.reload()?;
		if upserted.applied.len() < chunks.len() {
			debug!(skipped = chunks.len() - upserted.applied.len(), batch = %batch, "kept rows written by newer batches");
		}
		info!(chunks = upserted.applied.len(), batch = %batch, "upserted lexical batch");
		Ok(())
	}

	pub fn add_document(&self, doc: &Document) -> Result<()> {
		row_store::upsert_document(&self.store.lock().conn, doc)
	}

	pub fn document_title(&self, doc_id: &str) -> Result<Option<String>> {
		row_store::document_title(&self.store.lock().conn, doc_id)
	}

	pub fn get(&self, chunk_id: &str) -> Result<Option<Chunk>> {
		row_store::get(&self.store.lock().conn, chunk_id)
	}

	pub fn row_count(&self) -> Result<usize> {
		row_store::count(&self.store.lock().conn)
	}

	pub fn last_batch(&self) -> Result<Option<BatchId>> {
		row_store::last_batch(&self.store.lock().conn)
	}

	/// Every batch id committed to the row store, ascending.
	pub fn batches(&self) -> Result<Vec<BatchId>> {
		row_store::batches(&self.store.lock().conn)
	}

	pub fn batch_chunks(&self, batch: BatchId) -> Result<Vec<Chunk>> {
		row_store::batch_chunks(&self.store.lock().conn, batch)
	}

	/// Up to `top_k` chunks ranked by BM25 over `text`. Query syntax errors
	/// are tolerated: unparsable parts are dropped.
	pub fn search(&self, query: &str, top_k: usize) -> Result<Vec<LexicalHit>> {
		let searcher = self.reader.searcher();
		if searcher.num_docs() == 0 {
			return Err(LexicalIndexError::EmptyIndex);
		}
		if top_k == 0 || query.trim().is_empty() {
			return Ok(Vec::new());
		}
		let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
		let (parsed, errors) = parser.parse_query_lenient(query);
		if !errors.is_empty() {
			debug!(query, errors = errors.len(), "lenient query parse dropped clauses");
		}

		let top_docs = searcher.search(&parsed, &TopDocs::with_limit(top_k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let field = |f: Field| doc.get_first(f).and_then(|v| v.as_str()).unwrap_or("").to_string();
			hits.push(LexicalHit {
				chunk_id: field(self.fields.chunk_id),
				doc_id: field(self.fields.doc_id),
				text: field(self.fields.text),
				section: field(self.fields.section),
				score,
			});
		}
		debug!(top_k, hits = hits.len(), "keyword search");
		Ok(hits)
	}

	pub fn check_integrity(&self) -> Result<IntegrityReport> {
		let (rows, row_batch) = {
			let store = self.store.lock();
			(row_store::count(&store.conn)?, row_store::last_batch(&store.conn)?)
		};
		let indexed = self.reader.searcher().num_docs() as usize;
		let index_batch = self.index.load_metas()?.payload.and_then(|p| p.parse().ok()).map(BatchId);
		Ok(IntegrityReport { rows, indexed, row_batch, index_batch, in_sync: rows == indexed && row_batch == index_batch })
	}

	/// Fails with [`LexicalIndexError::Desync`] when the search index has
	/// drifted from the row store.
	pub fn verify(&self) -> Result<IntegrityReport> {
		let report = self.check_integrity()?;
		if !report.in_sync {
			warn!(?report, "lexical index desync detected");
			return Err(LexicalIndexError::Desync { rows: report.rows, indexed: report.indexed });
		}
		Ok(report)
	}

	/// Drops every search entry and re-derives them from the row store.
	pub fn rebuild(&self) -> Result<IntegrityReport> {
		{
			let mut store = self.store.lock();
			let rows = row_store::all_indexed_rows(&store.conn)?;
			let batch = row_store::last_batch(&store.conn)?;
			let writer = &mut store.writer;
			writer.delete_all_documents()?;
			for IndexedRow { chunk_id, doc_id, text, section } in &rows {
				writer.add_document(self.to_document(chunk_id, doc_id, text, section))?;
			}
			let mut prepared = writer.prepare_commit()?;
			if let Some(batch) = batch {
				prepared.set_payload(&batch.0.to_string());
			}
			prepared.commit()?;
			self.reader.reload()?;
			info!(rows = rows.len(), "rebuilt lexical index from row store");
		}
		self.check_integrity()
	}

	fn to_document(&self, chunk_id: &str, doc_id: &str, text: &str, section: &str) -> TantivyDocument {
		doc!(
			self.fields.chunk_id => chunk_id.to_string(),
			self.fields.doc_id => doc_id.to_string(),
			self.fields.text => text.to_string(),
			self.fields.section => section.to_string(),
		)
	}
}
