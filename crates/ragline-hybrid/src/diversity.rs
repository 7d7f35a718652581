//! Maximal Marginal Relevance selection over fused candidates.
use ragline_core::similarity::cosine_similarity;
use ragline_core::types::{FusedResult, SelectionResult};

/// Greedy MMR. Returns indices into `pool` in selection order.
///
/// Each step picks the remaining item maximizing
/// `lambda * cos(query, item) - (1 - lambda) * max cos(item, selected)`;
/// ties go to the item that comes first in `pool`.
pub fn mmr_select(query: &[f32], pool: &[&[f32]], k: usize, lambda: f32) -> Vec<usize> {
    let relevance: Vec<f32> = pool.iter().map(|v| cosine_similarity(query, v)).collect();
    // max similarity to anything selected so far; meaningless until the first pick
    let mut redundancy = vec![f32::NEG_INFINITY; pool.len()];
    let mut remaining: Vec<usize> = (0..pool.len()).collect();
    let mut selected = Vec::with_capacity(k.min(pool.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;
        for (pos, &i) in remaining.iter().enumerate() {
            let penalty = if selected.is_empty() { 0.0 } else { redundancy[i] };
            let score = lambda * relevance[i] - (1.0 - lambda) * penalty;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((pos, score));
            }
        }
        let Some((pos, _)) = best else { break };
        let picked = remaining.remove(pos);
        for &i in &remaining {
            redundancy[i] = redundancy[i].max(cosine_similarity(pool[i], pool[picked]));
        }
        selected.push(picked);
    }
    selected
}

/// Runs MMR over the fused items that carry an embedding. Items without one
/// take no part in scoring: they are reported in `excluded` and fill any slots
/// left after the MMR picks, in fused order, up to `k`.
pub fn select(query: &[f32], fused: Vec<FusedResult>, k: usize, lambda: f32) -> SelectionResult {
    let (with, without): (Vec<FusedResult>, Vec<FusedResult>) =
        fused.into_iter().partition(|f| f.candidate.embedding.is_some());
    let picked = {
        let vectors: Vec<&[f32]> = with.iter().map(|f| f.candidate.embedding.as_deref().unwrap_or_default()).collect();
        mmr_select(query, &vectors, k, lambda)
    };
    let mut slots: Vec<Option<FusedResult>> = with.into_iter().map(Some).collect();
    let mut items: Vec<FusedResult> = picked.into_iter().filter_map(|i| slots[i].take()).collect();
    let excluded = without.iter().map(|f| f.candidate.id.clone()).collect();
    let room = k.saturating_sub(items.len());
    items.extend(without.into_iter().take(room));
    SelectionResult { items, excluded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragline_core::types::{Candidate, Method, Provenance};

    #[test]
    fn lambda_one_is_relevance_order() {
        let q = [1.0, 0.0];
        let pool: Vec<&[f32]> = vec![&[0.0, 1.0], &[1.0, 0.0], &[0.7, 0.7], &[1.0, 0.0]];
        assert_eq!(mmr_select(&q, &pool, 4, 1.0), vec![1, 3, 2, 0]);
    }

    #[test]
    fn redundancy_pushes_near_duplicates_down() {
        let q = [1.0, 0.0];
        // 0 and 1 are identical; 2 is less relevant but different
        let pool: Vec<&[f32]> = vec![&[1.0, 0.1], &[1.0, 0.1], &[0.6, -0.8]];
        assert_eq!(mmr_select(&q, &pool, 2, 0.5), vec![0, 2]);
        assert_eq!(mmr_select(&q, &pool, 2, 1.0), vec![0, 1]);
    }

    #[test]
    fn k_bounds_and_exhaustion() {
        let q = [1.0, 0.0];
        let pool: Vec<&[f32]> = vec![&[1.0, 0.0], &[0.0, 1.0]];
        assert_eq!(mmr_select(&q, &pool, 10, 0.6).len(), 2);
        assert!(mmr_select(&q, &pool, 0, 0.6).is_empty());
        assert!(mmr_select(&q, &[], 3, 0.6).is_empty());
    }

    fn fused(id: &str, embedding: Option<Vec<f32>>) -> FusedResult {
        let candidate = Candidate {
            id: id.into(),
            text: format!("chunk {id}"),
            method: Method::Keyword,
            score: 1.0,
            embedding,
            parent_id: None,
        };
        FusedResult { candidate, rrf_score: 0.0, provenance: Provenance::default() }
    }

    #[test]
    fn unembedded_items_fill_remaining_slots_in_fused_order() {
        let q = [1.0, 0.0];
        let pool = vec![
            fused("a", None),
            fused("b", Some(vec![1.0, 0.0])),
            fused("c", None),
            fused("d", None),
        ];
        let result = select(&q, pool, 3, 0.6);
        let ids: Vec<&str> = result.items.iter().map(FusedResult::id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        assert_eq!(result.excluded, vec!["a", "c", "d"]);
    }

    #[test]
    fn all_unembedded_keeps_fused_order() {
        let pool = vec![fused("x", None), fused("y", None)];
        let result = select(&[1.0, 0.0], pool, 5, 0.6);
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.items[0].candidate.id, "x");
        assert_eq!(result.excluded, vec!["x", "y"]);
    }
}
