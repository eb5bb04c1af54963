use serde::{Deserialize, Serialize};

/// Nearest-neighbour structure backing a [`crate::VectorIndex`].
///
/// In TOML: `family = "flat_ip"`, `family = "flat_l2"` or
/// `family = { ivf = { nlist = 64, nprobe = 8 } }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexFamily {
    /// Exhaustive inner product. Cosine similarity when vectors are normalized.
    FlatIp,
    /// Exhaustive squared euclidean distance, reported as `1 / (1 + d²)`.
    FlatL2,
    /// Inverted file over `nlist` k-means cells, probing the `nprobe` closest.
    Ivf { nlist: usize, nprobe: usize },
}

impl IndexFamily {
    /// Inverted-file parameters sized for a corpus of `total` vectors.
    pub fn ivf_for_corpus(total: usize) -> Self {
        let sqrt_n = (total as f64).sqrt() as usize;
        let mut nlist = (2 * sqrt_n).min(65_536);
        // tiny corpora: keep nlist below the row count
        nlist = if total > 1 { nlist.clamp(1, total - 1) } else { 1 };
        let nprobe = (nlist / 8).max(1);
        IndexFamily::Ivf { nlist, nprobe }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IndexFamily::FlatIp => "flat_ip",
            IndexFamily::FlatL2 => "flat_l2",
            IndexFamily::Ivf { .. } => "ivf",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    pub dim: usize,
    pub family: IndexFamily,
    /// L2-normalize vectors on `add` and queries on `search`.
    pub normalize: bool,
    /// Row count at which an inverted-file index trains itself.
    /// Defaults to `39 * nlist`.
    pub train_threshold: Option<usize>,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self { dim: 384, family: IndexFamily::FlatIp, normalize: true, train_threshold: None }
    }
}

impl VectorIndexConfig {
    pub fn new(dim: usize, family: IndexFamily) -> Self {
        Self { dim, family, ..Self::default() }
    }

    pub fn train_threshold(&self) -> Option<usize> {
        match self.family {
            IndexFamily::Ivf { nlist, .. } => Some(self.train_threshold.unwrap_or(nlist * 39).max(nlist)),
            _ => None,
        }
    }
}
