use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::fusion::FusionStrategy;

/// `[retrieval]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub fusion: FusionStrategy,
    /// Each sub-search asks for `top_k * candidate_multiplier` candidates.
    pub candidate_multiplier: usize,
    /// Hard limit per sub-search; unset means wait indefinitely.
    pub sub_search_timeout_ms: Option<u64>,
    pub embed_batch_size: usize,
    pub show_progress: bool,
    /// Rebuild the keyword search structure on open when it has drifted
    /// from the stored rows.
    pub rebuild_on_open: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 10,
            fusion: FusionStrategy::default(),
            candidate_multiplier: 2,
            sub_search_timeout_ms: None,
            embed_batch_size: 32,
            show_progress: false,
            rebuild_on_open: false,
        }
    }
}

impl RetrievalConfig {
    pub fn sub_search_timeout(&self) -> Option<Duration> {
        self.sub_search_timeout_ms.map(Duration::from_millis)
    }

    pub fn candidates(&self, top_k: usize) -> usize {
        top_k.saturating_mul(self.candidate_multiplier.max(1))
    }
}
