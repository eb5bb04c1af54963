//! The concrete retriever over [`VectorIndex`] and [`LexicalIndex`] kept in
//! one directory.

use anyhow::{bail, Context};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use passagedb_core::traits::Embedder;
use passagedb_text::LexicalIndex;
use passagedb_vector::{blob_path, VectorIndex, VectorIndexConfig};

use crate::config::RetrievalConfig;
use crate::retriever::HybridRetriever;

pub const VECTOR_INDEX_NAME: &str = "passages";

pub type PassageRetriever = HybridRetriever<VectorIndex, LexicalIndex>;

impl HybridRetriever<VectorIndex, LexicalIndex> {
    /// Opens both stores under `dir`, loading a saved vector index when one
    /// exists and creating an empty one from `vector` otherwise. A keyword
    /// search structure that has drifted from its rows is rebuilt when
    /// `rebuild_on_open` is set and surfaces through `status()` otherwise.
    pub fn open(
        dir: &Path,
        vector: VectorIndexConfig,
        config: RetrievalConfig,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        if embedder.dim() != vector.dim {
            bail!("embedder produces {}-dim vectors but the vector index expects {}", embedder.dim(), vector.dim);
        }
        let dense = if blob_path(dir, VECTOR_INDEX_NAME).exists() {
            let loaded = VectorIndex::load(dir, VECTOR_INDEX_NAME).context("loading vector index")?;
            if loaded.dim() != vector.dim {
                bail!("saved vector index has dim {}, configured dim is {}", loaded.dim(), vector.dim);
            }
            loaded
        } else {
            VectorIndex::new(vector)?
        };
        let keyword = LexicalIndex::open(dir).context("opening lexical index")?;
        if config.rebuild_on_open && !keyword.check_integrity().context("checking lexical index")?.in_sync {
            keyword.rebuild().context("rebuilding lexical index")?;
            info!(dir = %dir.display(), "rebuilt lexical index on open");
        }
        info!(dir = %dir.display(), vectors = dense.len(), "opened passage retriever");
        Ok(Self::new(dense, keyword, embedder, config))
    }

    /// Persists the vector index; the lexical store writes through on ingest.
    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        self.dense().read().save(dir, VECTOR_INDEX_NAME)?;
        Ok(())
    }
}
