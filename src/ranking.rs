//! Ordering of scored pairs, best first.

use crate::primer::PrimerPair;
use std::cmp::Ordering;

/// Penalty used in the sort key when no pairwise check produced one.
pub const ABSENT_PENALTY_RANK: f64 = 0.0;

fn rank_order(a: &PrimerPair, b: &PrimerPair) -> Ordering {
    let a_penalty = a.penalty.unwrap_or(ABSENT_PENALTY_RANK);
    let b_penalty = b.penalty.unwrap_or(ABSENT_PENALTY_RANK);
    b.stats
        .nhits
        .cmp(&a.stats.nhits)
        .then(b.stats.nseq.cmp(&a.stats.nseq))
        .then(b.stats.info.total_cmp(&a.stats.info))
        .then(a_penalty.total_cmp(&b_penalty))
}

/// Drops pairs without qualifying foreground products and orders the rest,
/// best first, by (`nhits`, `nseq`, `info`, lowest penalty).
pub fn rank_pairs(pairs: Vec<PrimerPair>) -> Vec<PrimerPair> {
    let mut ranked: Vec<PrimerPair> = pairs.into_iter().filter(|p| p.stats.nhits > 0).collect();
    ranked.sort_unstable_by(rank_order);
    ranked
}
