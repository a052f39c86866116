//! Reciprocal Rank Fusion of the dense and graph result lists
//!
//! RRF only looks at rank order, so cosine similarities and the constant
//! graph-hit score never have to be put on a common scale. Each list is
//! ranked on its own, every item at 1-based rank `r` contributes
//! `1 / (k + r)`, and contributions are summed per id.

use std::collections::HashMap;

use tracing::debug;

use super::dense::score_desc;
use super::types::{FusedResult, GraphHit, Metadata, PassageHit};

/// Conventional RRF damping constant
pub const DEFAULT_RRF_K: u32 = 60;

/// Anything that can take part in a fused ranking
trait Ranked {
    fn id(&self) -> &str;
    fn text(&self) -> &str;
    fn metadata(&self) -> &Metadata;
    fn score(&self) -> f32;
}

impl Ranked for PassageHit {
    fn id(&self) -> &str {
        &self.id
    }
    fn text(&self) -> &str {
        &self.text
    }
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn score(&self) -> f32 {
        self.score
    }
}

impl Ranked for GraphHit {
    fn id(&self) -> &str {
        &self.id
    }
    fn text(&self) -> &str {
        &self.text
    }
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }
    fn score(&self) -> f32 {
        self.score
    }
}

/// Running totals per id, kept in first-seen order
#[derive(Default)]
struct Fuser {
    order: Vec<FusedResult>,
    index: HashMap<String, usize>,
}

impl Fuser {
    fn add_list<T: Ranked>(&mut self, items: &[T], k: u32) {
        // Stable: equal native scores keep their input order
        let mut ranked: Vec<&T> = items.iter().collect();
        ranked.sort_by(|a, b| score_desc(a.score(), b.score()));

        for (idx, item) in ranked.into_iter().enumerate() {
            let rank = idx + 1;
            let contribution = 1.0 / (k as f64 + rank as f64);

            match self.index.get(item.id()) {
                Some(&slot) => self.order[slot].fusion_score += contribution,
                None => {
                    self.index.insert(item.id().to_string(), self.order.len());
                    self.order.push(FusedResult {
                        id: item.id().to_string(),
                        text: item.text().to_string(),
                        metadata: item.metadata().clone(),
                        fusion_score: contribution,
                    });
                }
            }
        }
    }

    fn finish(self) -> Vec<FusedResult> {
        let mut fused = self.order;
        fused.sort_by(|a, b| b.fusion_score.total_cmp(&a.fusion_score));
        fused
    }
}

/// Merge the dense and graph lists into one deduplicated list, best first.
///
/// The dense list is walked before the graph list, so when an id appears in
/// both, the dense payload is the one kept. Ties in the summed score keep
/// first-seen order.
pub fn fuse(dense: &[PassageHit], graph: &[GraphHit], k: u32) -> Vec<FusedResult> {
    let mut fuser = Fuser::default();
    fuser.add_list(dense, k);
    fuser.add_list(graph, k);
    let fused = fuser.finish();

    debug!(
        dense = dense.len(),
        graph = graph.len(),
        fused = fused.len(),
        k = k,
        "Fused result lists"
    );

    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(fused: &[FusedResult]) -> Vec<&str> {
        fused.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_fuse_empty() {
        assert!(fuse(&[], &[], DEFAULT_RRF_K).is_empty());
    }

    #[test]
    fn test_single_list_keeps_rank_order() {
        let dense = vec![
            PassageHit::new("b", "second", 0.4),
            PassageHit::new("a", "first", 0.9),
            PassageHit::new("c", "tied-1", 0.1),
            PassageHit::new("d", "tied-2", 0.1),
        ];

        let fused = fuse(&dense, &[], DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["a", "b", "c", "d"]);
        assert!((fused[0].fusion_score - 1.0 / 61.0).abs() < 1e-12);
        assert!((fused[3].fusion_score - 1.0 / 64.0).abs() < 1e-12);
    }

    #[test]
    fn test_shared_id_scores_higher_than_singletons() {
        let dense = vec![
            PassageHit::new("only-dense", "x", 0.9),
            PassageHit::new("graph::Turbine Blades", "dense copy", 0.8),
        ];
        let graph = vec![GraphHit::new("Turbine Blades", "graph copy", None)];

        let fused = fuse(&dense, &graph, DEFAULT_RRF_K);
        assert_eq!(fused.len(), 2);

        let shared = &fused[0];
        assert_eq!(shared.id, "graph::Turbine Blades");
        assert!((shared.fusion_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!(shared.fusion_score > fused[1].fusion_score);
        // First-seen payload wins
        assert_eq!(shared.text, "dense copy");
    }

    #[test]
    fn test_no_duplicate_ids() {
        let dense = vec![
            PassageHit::new("a", "one", 0.5),
            PassageHit::new("a", "two", 0.4),
        ];
        let fused = fuse(&dense, &[], DEFAULT_RRF_K);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].text, "one");
    }

    #[test]
    fn test_tie_order_follows_input() {
        let forward = vec![PassageHit::new("x", "", 0.5), PassageHit::new("y", "", 0.5)];
        let reversed = vec![PassageHit::new("y", "", 0.5), PassageHit::new("x", "", 0.5)];

        assert_eq!(fuse(&forward, &[], DEFAULT_RRF_K)[0].id, "x");
        assert_eq!(fuse(&reversed, &[], DEFAULT_RRF_K)[0].id, "y");
    }

    #[test]
    fn test_dense_first_wins_equal_fused_score() {
        let dense = vec![PassageHit::new("doc", "", 0.7)];
        let graph = vec![GraphHit::new("Combustion Canister", "snippet", None)];

        let fused = fuse(&dense, &graph, DEFAULT_RRF_K);
        assert_eq!(ids(&fused), vec!["doc", "graph::Combustion Canister"]);
        assert_eq!(fused[0].fusion_score, fused[1].fusion_score);
    }

    #[test]
    fn test_nan_native_scores_rank_last() {
        let dense: Vec<_> = (0..40)
            .map(|i| {
                let score = if i % 2 == 0 { f32::NAN } else { i as f32 / 40.0 };
                PassageHit::new(format!("d{i}"), "", score)
            })
            .collect();

        let fused = fuse(&dense, &[], DEFAULT_RRF_K);
        assert_eq!(&ids(&fused)[..3], ["d39", "d37", "d35"]);
        assert!(fused[20..].iter().all(|r| r.id[1..].parse::<u32>().unwrap() % 2 == 0));
    }

    #[test]
    fn test_scores_descending() {
        let dense: Vec<_> = (0..10)
            .map(|i| PassageHit::new(format!("d{i}"), "", 1.0 - i as f32 * 0.05))
            .collect();
        let graph = vec![GraphHit::new("Fan", "", None)];

        let fused = fuse(&dense, &graph, 1);
        assert!(fused.windows(2).all(|w| w[0].fusion_score >= w[1].fusion_score));
    }
}
