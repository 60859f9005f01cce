// Weighted Reciprocal Rank Fusion

use std::collections::HashMap;

/// A passage after fusion: RRF score plus the raw vector similarity when
/// the vector list contained it (used for tie-breaking and rerank blending).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedHit {
    pub id: u64,
    pub score: f32,
    pub vector_score: Option<f32>,
}

/// Fuse two ranked lists with weighted RRF.
///
/// `score(d) = Σ_list weight_list / (k + rank_list(d))`, ranks 1-indexed;
/// a list that does not contain `d` contributes nothing. Sorted by
/// descending RRF score, ties broken by descending vector similarity, then
/// ascending id.
pub fn reciprocal_rank_fusion(
    vector_results: &[(u64, f32)],
    bm25_results: &[(u64, f32)],
    k: f32,
    vector_weight: f32,
    bm25_weight: f32,
) -> Vec<FusedHit> {
    let mut fused: HashMap<u64, FusedHit> = HashMap::new();

    for (rank, &(id, similarity)) in vector_results.iter().enumerate() {
        let contribution = vector_weight / (k + (rank + 1) as f32);
        let entry = fused.entry(id).or_insert(FusedHit {
            id,
            score: 0.0,
            vector_score: None,
        });
        entry.score += contribution;
        entry.vector_score = Some(similarity);
    }

    for (rank, &(id, _)) in bm25_results.iter().enumerate() {
        let contribution = bm25_weight / (k + (rank + 1) as f32);
        fused
            .entry(id)
            .or_insert(FusedHit {
                id,
                score: 0.0,
                vector_score: None,
            })
            .score += contribution;
    }

    let mut combined: Vec<FusedHit> = fused.into_values().collect();
    combined.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| {
                b.vector_score
                    .unwrap_or(f32::NEG_INFINITY)
                    .total_cmp(&a.vector_score.unwrap_or(f32::NEG_INFINITY))
            })
            .then_with(|| a.id.cmp(&b.id))
    });
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: f32 = 60.0;

    #[test]
    fn presence_in_both_lists_wins() {
        let vector = vec![(1, 0.9), (2, 0.8), (3, 0.7)];
        let bm25 = vec![(3, 10.0), (1, 8.0), (4, 5.0)];

        let fused = reciprocal_rank_fusion(&vector, &bm25, K, 0.7, 0.3);
        assert_eq!(fused.len(), 4);

        let top: Vec<u64> = fused.iter().take(2).map(|h| h.id).collect();
        assert!(top.contains(&1));
        assert!(top.contains(&3));
    }

    #[test]
    fn weights_shift_the_balance() {
        // Id 1 leads the vector list, id 2 leads bm25, symmetric ranks.
        let vector = vec![(1, 0.9), (2, 0.5)];
        let bm25 = vec![(2, 9.0), (1, 4.0)];

        let vector_heavy = reciprocal_rank_fusion(&vector, &bm25, K, 0.7, 0.3);
        assert_eq!(vector_heavy[0].id, 1);

        let bm25_heavy = reciprocal_rank_fusion(&vector, &bm25, K, 0.3, 0.7);
        assert_eq!(bm25_heavy[0].id, 2);
    }

    #[test]
    fn absent_list_contributes_zero() {
        let vector = vec![(1, 0.9), (2, 0.8)];
        let fused = reciprocal_rank_fusion(&vector, &[], K, 0.7, 0.3);

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].id, 1);
        assert!((fused[0].score - 0.7 / 61.0).abs() < 1e-6);
    }

    #[test]
    fn both_empty_fuses_to_nothing() {
        assert!(reciprocal_rank_fusion(&[], &[], K, 0.7, 0.3).is_empty());
    }

    #[test]
    fn vector_similarity_breaks_score_ties() {
        // Same ranks in disjoint positions: ids 1 and 2 only in the vector
        // list at symmetric weights and ranks would differ; instead craft
        // an exact tie via the bm25 list.
        let vector = vec![(1, 0.2), (2, 0.9)];
        let bm25 = vec![(2, 3.0), (1, 2.0)];
        // id1: 0.5/61 + 0.5/62 and id2: 0.5/62 + 0.5/61 are equal.
        let fused = reciprocal_rank_fusion(&vector, &bm25, K, 0.5, 0.5);
        assert_eq!(fused.len(), 2);
        assert!((fused[0].score - fused[1].score).abs() < 1e-7);
        // Higher vector similarity wins the tie.
        assert_eq!(fused[0].id, 2);
    }

    #[test]
    fn id_breaks_full_ties() {
        // Symmetric ranks and equal vector similarities: only the id is
        // left to decide.
        let vector = vec![(4, 0.5), (9, 0.5)];
        let bm25 = vec![(9, 1.0), (4, 1.0)];
        let fused = reciprocal_rank_fusion(&vector, &bm25, K, 0.5, 0.5);
        assert_eq!(fused[0].id, 4);
    }

    #[test]
    fn rrf_uses_ranks_not_raw_scores() {
        let a = vec![(1, 100.0), (2, 0.01)];
        let b = vec![(2, 0.99), (1, 0.98)];
        let fused = reciprocal_rank_fusion(&a, &b, K, 0.5, 0.5);
        let score_of = |id: u64| fused.iter().find(|h| h.id == id).unwrap().score;
        // Symmetric ranks give symmetric scores regardless of magnitudes.
        assert!((score_of(1) - score_of(2)).abs() < 1e-6);
    }
}
