//! On-disk form: `{name}.index` (bincode blob with config, rows and cells)
//! next to `{name}_chunks.json` (chunk sidecar, one entry per row). The two
//! files are only meaningful as a pair: the blob carries an xxhash of the
//! sidecar bytes it was saved with.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::hash::Hasher;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use twox_hash::XxHash64;

use passagedb_core::{BatchId, Chunk};

use crate::config::VectorIndexConfig;
use crate::error::{Result, VectorIndexError};
use crate::index::VectorIndex;
use crate::ivf::IvfState;

const BLOB_FORMAT: u32 = 2;

#[derive(Serialize)]
struct BlobRef<'a> {
    format: u32,
    config: &'a VectorIndexConfig,
    rows: usize,
    vectors: &'a [f32],
    ivf: Option<&'a IvfState>,
    row_batches: &'a [BatchId],
    batches: &'a BTreeSet<BatchId>,
    sidecar_checksum: u64,
}

#[derive(Deserialize)]
struct Blob {
    format: u32,
    config: VectorIndexConfig,
    rows: usize,
    vectors: Vec<f32>,
    ivf: Option<IvfState>,
    row_batches: Vec<BatchId>,
    batches: BTreeSet<BatchId>,
    sidecar_checksum: u64,
}

pub fn blob_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.index"))
}

pub fn sidecar_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}_chunks.json"))
}

impl VectorIndex {
    pub fn save(&self, dir: &Path, name: &str) -> Result<()> {
        fs::create_dir_all(dir)?;
        let sidecar = serde_json::to_vec(&self.chunks)?;
        let blob = BlobRef {
            format: BLOB_FORMAT,
            config: &self.config,
            rows: self.len(),
            vectors: &self.vectors,
            ivf: self.ivf.as_ref(),
            row_batches: &self.row_batches,
            batches: &self.batches,
            sidecar_checksum: checksum(&sidecar),
        };
        write_atomic(&blob_path(dir, name), |w| Ok(bincode::serialize_into(w, &blob)?))?;
        write_atomic(&sidecar_path(dir, name), |w| Ok(w.write_all(&sidecar)?))?;
        info!(dir = %dir.display(), name, rows = self.len(), "saved vector index");
        Ok(())
    }

    pub fn load(dir: &Path, name: &str) -> Result<Self> {
        let sidecar = sidecar_path(dir, name);
        if !sidecar.exists() {
            return Err(VectorIndexError::MissingSidecar(sidecar));
        }
        let blob: Blob = bincode::deserialize_from(BufReader::new(File::open(blob_path(dir, name))?))?;
        if blob.format != BLOB_FORMAT {
            return Err(VectorIndexError::InvalidConfig(format!("unsupported index blob format {}", blob.format)));
        }
        let bytes = fs::read(&sidecar)?;
        let chunks: Vec<Chunk> = serde_json::from_slice(&bytes)?;
        if chunks.len() != blob.rows || blob.row_batches.len() != blob.rows {
            return Err(VectorIndexError::SidecarMismatch { rows: blob.rows, chunks: chunks.len() });
        }
        let actual = checksum(&bytes);
        if actual != blob.sidecar_checksum {
            return Err(VectorIndexError::SidecarChecksum { expected: blob.sidecar_checksum, actual });
        }
        if blob.vectors.len() != blob.rows * blob.config.dim {
            return Err(VectorIndexError::DimensionMismatch {
                expected: blob.rows * blob.config.dim,
                actual: blob.vectors.len(),
            });
        }

        let mut index = VectorIndex::new(blob.config)?;
        index.by_id = chunks.iter().enumerate().map(|(row, c)| (c.chunk_id.clone(), row)).collect::<HashMap<_, _>>();
        index.vectors = blob.vectors;
        index.chunks = chunks;
        index.row_batches = blob.row_batches;
        index.ivf = blob.ivf;
        index.batches = blob.batches;
        info!(dir = %dir.display(), name, rows = index.len(), "loaded vector index");
        Ok(index)
    }
}

fn checksum(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    Hasher::write(&mut hasher, bytes);
    hasher.finish()
}

fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = path.with_extension("tmp");
    let mut w = BufWriter::new(File::create(&tmp)?);
    write(&mut w)?;
    w.flush()?;
    fs::rename(&tmp, path)?;
    Ok(())
}
