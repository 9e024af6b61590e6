//! In-silico PCR: the product implied by a primer pair's two hits in one genome.

use crate::{
    alignment::HitMap,
    error::{PipelineError, Result, Stage},
    genome::GenomeSequences,
    primer::PrimerPair,
};
use serde::{Deserialize, Serialize};

/// Products longer than this come from hits at both ends of a linearized
/// circular sequence rather than from real amplification.
pub const DEFAULT_MAX_PRODUCT_LENGTH: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcrProduct {
    /// Contig the product was cut from.
    pub template: String,
    pub seq: String,
    /// 1-based position of the upstream primer.
    pub start: usize,
    /// Downstream primer position plus primer length.
    pub end: usize,
}

impl PcrProduct {
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }
}

/// Simulates amplification of `pair` in `genome`.
///
/// `Ok(None)` means no product: a primer has no hit, both hits are on the same
/// strand, the hits are on different contigs, or the product exceeds
/// `max_product_length`. The result does not depend on which primer is left.
pub fn simulate_product(
    pair: &PrimerPair,
    hits: &HitMap,
    genome: &GenomeSequences,
    primer_len: usize,
    max_product_length: usize,
) -> Result<Option<PcrProduct>> {
    let (Some(lhit), Some(rhit)) = (hits.get(&pair.left.id), hits.get(&pair.right.id)) else {
        return Ok(None);
    };
    if lhit.strand == rhit.strand {
        return Ok(None);
    }
    if lhit.target != rhit.target {
        return Ok(None);
    }

    let contig = genome.contig(&lhit.target).ok_or_else(|| {
        PipelineError::new(
            Stage::ProductSimulation,
            format!(
                "Contig '{}' reported by the aligner is missing from genome '{}' ({})",
                lhit.target,
                genome.name(),
                genome.path().display()
            ),
        )
    })?;

    let (low, high) = if lhit.pos <= rhit.pos {
        (lhit.pos, rhit.pos)
    } else {
        (rhit.pos, lhit.pos)
    };
    let end = high.checked_add(primer_len).ok_or_else(|| {
        PipelineError::new(
            Stage::HitResolution,
            format!(
                "Hit position {high} of primer pair {} on '{}' is out of range",
                pair.pair_id, lhit.target
            ),
        )
    })?;
    let from = low.saturating_sub(1).min(contig.len());
    let to = end.saturating_sub(1).min(contig.len()).max(from);
    let seq = &contig[from..to];
    if seq.len() > max_product_length {
        return Ok(None);
    }

    Ok(Some(PcrProduct {
        template: lhit.target.clone(),
        seq: String::from_utf8_lossy(seq).into_owned(),
        start: low,
        end,
    }))
}
