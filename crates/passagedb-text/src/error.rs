use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexicalIndexError {
	#[error("lexical index is empty")]
	EmptyIndex,

	#[error("row store holds {rows} chunks but the search index holds {indexed}; rebuild required")]
	Desync { rows: usize, indexed: usize },

	#[error("row store: {0}")]
	Sqlite(#[from] rusqlite::Error),

	#[error("search index: {0}")]
	Tantivy(#[from] tantivy::TantivyError),

	#[error("search index directory: {0}")]
	OpenDirectory(#[from] tantivy::directory::error::OpenDirectoryError),

	#[error("chunk metadata: {0}")]
	Metadata(#[from] serde_json::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LexicalIndexError>;
