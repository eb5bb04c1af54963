//! SQLite row store: the source of truth the search index is derived from.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use passagedb_core::{BatchId, Chunk, Document, Meta};

use crate::error::Result;

pub const ROW_STORE_FILE: &str = "rows.sqlite3";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
	id INTEGER PRIMARY KEY,
	chunk_id TEXT NOT NULL UNIQUE,
	doc_id TEXT NOT NULL,
	text TEXT NOT NULL,
	section TEXT NOT NULL DEFAULT '',
	start_offset INTEGER NOT NULL,
	end_offset INTEGER NOT NULL,
	metadata TEXT NOT NULL DEFAULT '{}',
	batch_id INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id);
CREATE TABLE IF NOT EXISTS documents (
	doc_id TEXT PRIMARY KEY,
	title TEXT NOT NULL,
	authors TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS batches (
	batch_id INTEGER PRIMARY KEY,
	chunks INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS meta (
	key TEXT PRIMARY KEY,
	value TEXT NOT NULL
);
";

const LAST_BATCH_KEY: &str = "last_batch";

/// The fields mirrored into the search index.
#[derive(Debug, Clone)]
pub struct IndexedRow {
	pub chunk_id: String,
	pub doc_id: String,
	pub text: String,
	pub section: String,
}

pub fn init(conn: &Connection) -> Result<()> {
	conn.execute_batch(SCHEMA)?;
	Ok(())
}

/// Outcome of [`upsert_chunks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upserted {
	/// Positions in the input of the chunks that were written. A chunk
	/// already stored by a newer batch is left alone.
	pub applied: Vec<usize>,
	/// The store's last batch afterwards; replaying an older batch never
	/// moves it backwards.
	pub last: BatchId,
}

/// Upserts `chunks` under `batch` and records the batch in the ledger.
pub fn upsert_chunks(tx: &Transaction<'_>, chunks: &[Chunk], batch: BatchId) -> Result<Upserted> {
	let mut stmt = tx.prepare_cached(
		"INSERT INTO chunks (chunk_id, doc_id, text, section, start_offset, end_offset, metadata, batch_id)
		 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
		 ON CONFLICT(chunk_id) DO UPDATE SET
			doc_id = excluded.doc_id,
			text = excluded.text,
			section = excluded.section,
			start_offset = excluded.start_offset,
			end_offset = excluded.end_offset,
			metadata = excluded.metadata,
			batch_id = excluded.batch_id
		 WHERE excluded.batch_id >= chunks.batch_id",
	)?;
	let mut applied = Vec::with_capacity(chunks.len());
	for (i, c) in chunks.iter().enumerate() {
		let changed = stmt.execute(params![
			c.chunk_id,
			c.doc_id,
			c.text,
			c.section(),
			c.start_offset as i64,
			c.end_offset as i64,
			serde_json::to_string(&c.metadata)?,
			batch.0 as i64,
		])?;
		if changed > 0 {
			applied.push(i);
		}
	}
	tx.execute(
		"INSERT INTO batches (batch_id, chunks) VALUES (?1, ?2)
		 ON CONFLICT(batch_id) DO UPDATE SET chunks = batches.chunks + excluded.chunks",
		params![batch.0 as i64, chunks.len() as i64],
	)?;
	let last = last_batch(tx)?.map_or(batch, |last| last.max(batch));
	set_last_batch(tx, last)?;
	Ok(Upserted { applied, last })
}

fn set_last_batch(conn: &Connection, batch: BatchId) -> Result<()> {
	conn.execute(
		"INSERT INTO meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
		params![LAST_BATCH_KEY, batch.0.to_string()],
	)?;
	Ok(())
}

pub fn last_batch(conn: &Connection) -> Result<Option<BatchId>> {
	let value: Option<String> = conn
		.query_row("SELECT value FROM meta WHERE key = ?1", params![LAST_BATCH_KEY], |row| row.get(0))
		.optional()?;
	Ok(value.and_then(|v| v.parse().ok()).map(BatchId))
}

pub fn batches(conn: &Connection) -> Result<Vec<BatchId>> {
	let mut stmt = conn.prepare("SELECT batch_id FROM batches ORDER BY batch_id")?;
	let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
	Ok(ids.into_iter().map(|id| BatchId(id as u64)).collect())
}

pub fn count(conn: &Connection) -> Result<usize> {
	let n: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
	Ok(n as usize)
}

const CHUNK_COLUMNS: &str = "chunk_id, doc_id, text, start_offset, end_offset, metadata";

type RawChunk = (String, String, String, i64, i64, String);

fn raw_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChunk> {
	Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

fn into_chunk((chunk_id, doc_id, text, start, end, metadata): RawChunk) -> Result<Chunk> {
	let metadata: Meta = serde_json::from_str(&metadata)?;
	let token_estimate = text.chars().count() / passagedb_core::chunker::CHARS_PER_TOKEN;
	Ok(Chunk {
		chunk_id,
		doc_id,
		text,
		start_offset: start as usize,
		end_offset: end as usize,
		token_estimate,
		metadata,
	})
}

pub fn get(conn: &Connection, chunk_id: &str) -> Result<Option<Chunk>> {
	let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE chunk_id = ?1");
	conn.query_row(&sql, params![chunk_id], raw_chunk).optional()?.map(into_chunk).transpose()
}

/// Rows whose latest write came from `batch`, in insertion order.
pub fn batch_chunks(conn: &Connection, batch: BatchId) -> Result<Vec<Chunk>> {
	let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE batch_id = ?1 ORDER BY id");
	let mut stmt = conn.prepare(&sql)?;
	let raw = stmt.query_map(params![batch.0 as i64], raw_chunk)?.collect::<rusqlite::Result<Vec<_>>>()?;
	raw.into_iter().map(into_chunk).collect()
}

pub fn all_indexed_rows(conn: &Connection) -> Result<Vec<IndexedRow>> {
	let mut stmt = conn.prepare("SELECT chunk_id, doc_id, text, section FROM chunks ORDER BY id")?;
	let rows = stmt
		.query_map([], |row| {
			Ok(IndexedRow { chunk_id: row.get(0)?, doc_id: row.get(1)?, text: row.get(2)?, section: row.get(3)? })
		})?
		.collect::<rusqlite::Result<Vec<_>>>()?;
	Ok(rows)
}

pub fn upsert_document(conn: &Connection, doc: &Document) -> Result<()> {
	conn.execute(
		"INSERT INTO documents (doc_id, title, authors) VALUES (?1, ?2, ?3)
		 ON CONFLICT(doc_id) DO UPDATE SET title = excluded.title, authors = excluded.authors",
		params![doc.doc_id, doc.title, doc.authors.join(", ")],
	)?;
	Ok(())
}

pub fn document_title(conn: &Connection, doc_id: &str) -> Result<Option<String>> {
	Ok(conn
		.query_row("SELECT title FROM documents WHERE doc_id = ?1", params![doc_id], |row| row.get(0))
		.optional()?)
}
