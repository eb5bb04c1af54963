//! Rank fusion of the dense and keyword result lists.
//!
//! Every fused entry is tagged [`SourceKind::Hybrid`] and its `score` is
//! replaced by the fused score. Entries are keyed by `chunk_id`; the first
//! occurrence (vector list first) supplies text and metadata. Only the first
//! occurrence of an id within one list contributes. Equal fused scores keep
//! first-seen order.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use passagedb_core::{SearchResult, SourceKind};

pub const DEFAULT_RRF_K: u32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Reciprocal rank fusion: rank `r` (0-based) contributes `1 / (k + r + 1)`.
    Rrf {
        #[serde(default = "default_rrf_k")]
        k: u32,
    },
    /// Each list is divided by its own maximum score, then weighted.
    Weighted {
        #[serde(default = "half")]
        vector_weight: f32,
        #[serde(default = "half")]
        keyword_weight: f32,
    },
}

fn default_rrf_k() -> u32 {
    DEFAULT_RRF_K
}

fn half() -> f32 {
    0.5
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::Rrf { k: DEFAULT_RRF_K }
    }
}

pub fn fuse(strategy: &FusionStrategy, vector: &[SearchResult], keyword: &[SearchResult]) -> Vec<SearchResult> {
    match *strategy {
        FusionStrategy::Rrf { k } => reciprocal_rank_fusion(vector, keyword, k),
        FusionStrategy::Weighted { vector_weight, keyword_weight } => {
            weighted_fusion(vector, keyword, vector_weight, keyword_weight)
        }
    }
}

pub fn reciprocal_rank_fusion(vector: &[SearchResult], keyword: &[SearchResult], k: u32) -> Vec<SearchResult> {
    let mut acc = Accumulator::default();
    for list in [vector, keyword] {
        for (rank, result) in first_occurrences(list).into_iter().enumerate() {
            acc.add(result, 1.0 / (k as f32 + rank as f32 + 1.0));
        }
    }
    acc.finish()
}

pub fn weighted_fusion(
    vector: &[SearchResult],
    keyword: &[SearchResult],
    vector_weight: f32,
    keyword_weight: f32,
) -> Vec<SearchResult> {
    let mut acc = Accumulator::default();
    for (list, weight) in [(vector, vector_weight), (keyword, keyword_weight)] {
        let max = list.iter().map(|r| r.score).fold(f32::NEG_INFINITY, f32::max);
        for result in first_occurrences(list) {
            // a list whose best score is not positive contributes nothing
            let normalized = if max > 0.0 { result.score / max } else { 0.0 };
            acc.add(result, weight * normalized);
        }
    }
    acc.finish()
}

fn first_occurrences(list: &[SearchResult]) -> Vec<&SearchResult> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(list.len());
    for result in list {
        if seen.insert(result.chunk_id.as_str()) {
            out.push(result);
        }
    }
    out
}

#[derive(Default)]
struct Accumulator {
    entries: Vec<SearchResult>,
    positions: HashMap<String, usize>,
}

impl Accumulator {
    fn add(&mut self, result: &SearchResult, contribution: f32) {
        match self.positions.get(&result.chunk_id) {
            Some(&pos) => self.entries[pos].score += contribution,
            None => {
                self.positions.insert(result.chunk_id.clone(), self.entries.len());
                let mut fused = result.clone();
                fused.score = contribution;
                fused.source = SourceKind::Hybrid;
                self.entries.push(fused);
            }
        }
    }

    fn finish(mut self) -> Vec<SearchResult> {
        // stable: ties stay in first-seen order
        self.entries.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passagedb_core::Meta;
    use pretty_assertions::assert_eq;

    fn result(id: &str, score: f32, source: SourceKind) -> SearchResult {
        let mut metadata = Meta::new();
        metadata.insert("from".into(), source.to_string());
        SearchResult { chunk_id: id.into(), doc_id: "d".into(), text: format!("{id} via {source}"), score, metadata, source }
    }

    fn ids(results: &[SearchResult]) -> Vec<&str> {
        results.iter().map(|r| r.chunk_id.as_str()).collect()
    }

    #[test]
    fn rrf_sums_reciprocal_ranks() {
        let vector = vec![result("x", 0.9, SourceKind::Vector), result("v1", 0.8, SourceKind::Vector)];
        let keyword = vec![
            result("y", 12.0, SourceKind::Keyword),
            result("k1", 9.0, SourceKind::Keyword),
            result("x", 3.0, SourceKind::Keyword),
        ];
        let fused = reciprocal_rank_fusion(&vector, &keyword, 60);

        let x = fused.iter().find(|r| r.chunk_id == "x").unwrap();
        let y = fused.iter().find(|r| r.chunk_id == "y").unwrap();
        assert!((x.score - (1.0 / 61.0 + 1.0 / 63.0)).abs() < 1e-6);
        assert!((y.score - 1.0 / 61.0).abs() < 1e-6);
        assert_eq!(fused[0].chunk_id, "x");
        assert!(fused.iter().all(|r| r.source == SourceKind::Hybrid));
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn appearing_in_both_lists_beats_one() {
        let vector = vec![result("both", 0.5, SourceKind::Vector), result("v", 0.4, SourceKind::Vector)];
        let keyword = vec![result("both", 2.0, SourceKind::Keyword), result("k", 1.0, SourceKind::Keyword)];
        let fused = reciprocal_rank_fusion(&vector, &keyword, 60);
        assert_eq!(fused[0].chunk_id, "both");
        assert!(fused[0].score > fused[1].score);
    }

    #[test]
    fn ties_keep_first_seen_order_and_vector_metadata_wins() {
        let vector = vec![result("a", 0.9, SourceKind::Vector), result("shared", 0.8, SourceKind::Vector)];
        let keyword = vec![result("b", 5.0, SourceKind::Keyword), result("shared", 4.0, SourceKind::Keyword)];
        let fused = reciprocal_rank_fusion(&vector, &keyword, 60);
        assert_eq!(ids(&fused), vec!["shared", "a", "b"]);
        let shared = &fused[0];
        assert_eq!(shared.text, "shared via vector");
        assert_eq!(shared.metadata.get("from").map(String::as_str), Some("vector"));
    }

    #[test]
    fn repeated_ids_within_a_list_count_once() {
        let vector = vec![result("a", 0.9, SourceKind::Vector), result("a", 0.9, SourceKind::Vector), result("b", 0.1, SourceKind::Vector)];
        let fused = reciprocal_rank_fusion(&vector, &[], 60);
        assert_eq!(ids(&fused), vec!["a", "b"]);
        assert!((fused[1].score - 1.0 / 62.0).abs() < 1e-6);
    }

    #[test]
    fn weighted_normalizes_each_list_by_its_max() {
        let vector = vec![result("a", 0.8, SourceKind::Vector), result("b", 0.4, SourceKind::Vector)];
        let keyword = vec![result("b", 20.0, SourceKind::Keyword), result("c", 5.0, SourceKind::Keyword)];
        let fused = weighted_fusion(&vector, &keyword, 0.5, 0.5);
        let score = |id: &str| fused.iter().find(|r| r.chunk_id == id).map(|r| r.score).unwrap();
        assert!((score("a") - 0.5).abs() < 1e-6);
        assert!((score("b") - 0.75).abs() < 1e-6);
        assert!((score("c") - 0.125).abs() < 1e-6);
        assert_eq!(ids(&fused), vec!["b", "a", "c"]);
    }

    #[test]
    fn weighted_with_non_positive_max_contributes_nothing() {
        let vector = vec![result("a", 0.0, SourceKind::Vector), result("b", -1.0, SourceKind::Vector)];
        let keyword = vec![result("c", 2.0, SourceKind::Keyword)];
        let fused = weighted_fusion(&vector, &keyword, 0.5, 0.5);
        assert_eq!(ids(&fused), vec!["c", "a", "b"]);
        assert_eq!(fused[1].score, 0.0);
        assert_eq!(fused[2].score, 0.0);
    }

    #[test]
    fn empty_inputs_fuse_to_empty() {
        assert!(fuse(&FusionStrategy::default(), &[], &[]).is_empty());
        let weighted = FusionStrategy::Weighted { vector_weight: 0.5, keyword_weight: 0.5 };
        assert!(fuse(&weighted, &[], &[]).is_empty());
    }
}
