//! Reciprocal Rank Fusion: score = Σ 1/(k + rank + 1), rank 0-indexed.
//!
//! Operates on list positions only, so lists whose native scores live on
//! different scales (cosine, BM25) can be combined without normalization.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use ragline_core::config::TieBreak;
use ragline_core::types::{Contribution, FusedResult, Provenance, RankedList};

/// Fuses `lists` into one ranking, best first.
///
/// Every candidate that appears in any list is kept. A repeated id within a
/// single list counts at its first position only. The copy seen first keeps
/// its payload; an embedding or parent mapping it lacks is taken from later
/// copies. Equal scores are ordered by `tie_break`, then by first appearance.
pub fn fuse(lists: &[RankedList], k: u32, tie_break: TieBreak) -> Vec<FusedResult> {
    let mut fused: Vec<FusedResult> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();

    for list in lists {
        let mut in_list: HashSet<&str> = HashSet::new();
        for (rank, candidate) in list.candidates.iter().enumerate() {
            if !in_list.insert(candidate.id.as_str()) {
                continue;
            }
            let contribution = Contribution { variant: list.variant, method: list.method, rank };
            let rrf = 1.0 / (f64::from(k) + rank as f64 + 1.0);
            match slot.get(&candidate.id) {
                Some(&i) => {
                    let entry = &mut fused[i];
                    entry.rrf_score += rrf;
                    entry.provenance.contributions.push(contribution);
                    if entry.candidate.embedding.is_none() {
                        entry.candidate.embedding = candidate.embedding.clone();
                    }
                    if entry.candidate.parent_id.is_none() {
                        entry.candidate.parent_id = candidate.parent_id.clone();
                    }
                }
                None => {
                    slot.insert(candidate.id.clone(), fused.len());
                    fused.push(FusedResult {
                        candidate: candidate.clone(),
                        rrf_score: rrf,
                        provenance: Provenance { contributions: vec![contribution] },
                    });
                }
            }
        }
    }

    // stable: equal keys keep first-seen order
    fused.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score).then_with(|| tie(a, b, tie_break)));
    fused
}

fn tie(a: &FusedResult, b: &FusedResult, tie_break: TieBreak) -> Ordering {
    match tie_break {
        TieBreak::MinRank => a.provenance.min_rank().cmp(&b.provenance.min_rank()),
        TieBreak::Identifier => a.id().cmp(b.id()),
    }
}
